use crate::error::{SlotError, SlotResult};
use crate::paytable::PayoutTable;
use crate::symbols::{ReelOutcome, Symbol};
use serde::{Deserialize, Serialize};

/// The symbol that scored a spin and how it scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningCombination {
    pub symbol: Symbol,
    pub count: usize,
    /// Table multiplier, doubled when every reel matches.
    pub multiplier: u64,
}

/// Pick the scoring symbol of an outcome, if any.
///
/// The most frequent symbol scores when it shows at least twice. Among equally
/// frequent symbols the higher table multiplier wins, and on equal multipliers
/// the symbol that appears first (leftmost reel) wins. A full line pays the
/// table multiplier twice.
pub fn score(outcome: &ReelOutcome, payouts: &PayoutTable) -> SlotResult<Option<WinningCombination>> {
    let counts = outcome.counts();
    let max_count = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    if max_count < 2 {
        return Ok(None);
    }

    let mut best: Option<(&Symbol, u32)> = None;
    for (sym, count) in counts {
        if count != max_count {
            continue;
        }
        let multiplier = payouts
            .get(sym)
            .ok_or_else(|| SlotError::config(format!("symbol {sym} has no payout multiplier")))?;
        // strict comparison keeps the leftmost symbol on ties
        if best.map_or(true, |(_, m)| multiplier > m) {
            best = Some((sym, multiplier));
        }
    }

    Ok(best.map(|(symbol, multiplier)| {
        let line_bonus = if max_count == outcome.len() { 2 } else { 1 };
        WinningCombination {
            symbol: symbol.clone(),
            count: max_count,
            multiplier: multiplier as u64 * line_bonus,
        }
    }))
}

/// Payout for `bet_amount` on `outcome`; 0 when nothing matches.
pub fn evaluate(outcome: &ReelOutcome, bet_amount: i64, payouts: &PayoutTable) -> SlotResult<u64> {
    if bet_amount < 0 {
        return Err(SlotError::argument(format!(
            "bet amount must not be negative, got {bet_amount}"
        )));
    }
    match score(outcome, payouts)? {
        Some(win) => (bet_amount as u64)
            .checked_mul(win.multiplier)
            .ok_or_else(|| SlotError::argument(format!("payout overflows for bet {bet_amount}"))),
        None => Ok(0),
    }
}
