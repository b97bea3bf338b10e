use crate::{
    error::{SlotError, SlotResult},
    evaluator::evaluate,
    paytable::{validate_payouts, PayoutTable, WeightTable},
    rng::{RandomSource, RngSource},
    sampler::WeightedSampler,
    symbols::{default_symbols, ReelOutcome, Symbol, DEFAULT_REEL_COUNT},
};
use serde::{Deserialize, Serialize};

/// A validated machine configuration. Immutable once built; updates build a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSlotConfig", into = "RawSlotConfig")]
pub struct SlotConfig {
    symbols: Vec<Symbol>,
    weights: WeightTable,
    payouts: PayoutTable,
    reel_count: usize,
    sampler: WeightedSampler,
}

#[derive(Serialize, Deserialize)]
struct RawSlotConfig {
    symbols: Vec<Symbol>,
    weights: WeightTable,
    payouts: PayoutTable,
    reel_count: usize,
}

impl TryFrom<RawSlotConfig> for SlotConfig {
    type Error = SlotError;

    fn try_from(raw: RawSlotConfig) -> SlotResult<Self> {
        SlotConfig::new(raw.symbols, raw.weights, raw.payouts, raw.reel_count)
    }
}

impl From<SlotConfig> for RawSlotConfig {
    fn from(config: SlotConfig) -> Self {
        RawSlotConfig {
            symbols: config.symbols,
            weights: config.weights,
            payouts: config.payouts,
            reel_count: config.reel_count,
        }
    }
}

impl SlotConfig {
    pub fn new(
        symbols: Vec<Symbol>,
        weights: WeightTable,
        payouts: PayoutTable,
        reel_count: usize,
    ) -> SlotResult<Self> {
        if reel_count == 0 {
            return Err(SlotError::argument("reel count must be positive"));
        }
        let sampler = WeightedSampler::new(&symbols, &weights)?;
        validate_payouts(&symbols, &payouts)?;
        Ok(Self {
            symbols,
            weights,
            payouts,
            reel_count,
            sampler,
        })
    }

    /// The classic seven-fruit, three-reel machine.
    pub fn default_fruit() -> Self {
        Self::new(
            default_symbols(),
            WeightTable::default_fruit(),
            PayoutTable::default_fruit(),
            DEFAULT_REEL_COUNT,
        )
        .expect("default fruit configuration is valid")
    }

    pub fn with_reel_count(&self, reel_count: usize) -> SlotResult<Self> {
        Self::new(
            self.symbols.clone(),
            self.weights.clone(),
            self.payouts.clone(),
            reel_count,
        )
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn payouts(&self) -> &PayoutTable {
        &self.payouts
    }

    pub fn reel_count(&self) -> usize {
        self.reel_count
    }

    pub fn total_weight(&self) -> u64 {
        self.sampler.total_weight()
    }

    /// weight / total weight, in configured symbol order.
    pub fn probabilities(&self) -> Vec<(Symbol, f64)> {
        let total = self.total_weight() as f64;
        self.symbols
            .iter()
            .map(|s| (s.clone(), self.weights.get(s).unwrap_or(0) as f64 / total))
            .collect()
    }

    pub fn spin_reels<R: RandomSource + ?Sized>(&self, rng: &mut R) -> ReelOutcome {
        self.sampler.sample_reel(self.reel_count, rng)
    }
}

impl PartialEq for SlotConfig {
    fn eq(&self, other: &Self) -> bool {
        self.symbols == other.symbols
            && self.weights == other.weights
            && self.payouts == other.payouts
            && self.reel_count == other.reel_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResult {
    pub outcome: ReelOutcome,
    pub bet_amount: i64,
    pub payout: u64,
    pub is_winner: bool,
}

pub fn spin_once<R: RandomSource + ?Sized>(
    config: &SlotConfig,
    bet_amount: i64,
    rng: &mut R,
) -> SlotResult<SpinResult> {
    if bet_amount < 0 {
        return Err(SlotError::argument(format!(
            "bet amount must not be negative, got {bet_amount}"
        )));
    }
    let outcome = config.spin_reels(rng);
    let payout = evaluate(&outcome, bet_amount, &config.payouts)?;
    Ok(SpinResult {
        outcome,
        bet_amount,
        payout,
        is_winner: payout > 0,
    })
}

/// Convenience: a reproducible spin from a seed.
pub fn replay_spin(config: &SlotConfig, bet_amount: i64, seed: u64) -> SlotResult<SpinResult> {
    let mut rng = RngSource::seeded(seed);
    spin_once(config, bet_amount, &mut rng)
}
