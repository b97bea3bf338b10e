use crate::error::{SlotError, SlotResult};
use crate::paytable::{validate_weights, WeightTable};
use crate::rng::RandomSource;
use crate::symbols::{ReelOutcome, Symbol};

/// Validated cumulative-weight walker over a fixed symbol order.
///
/// Drawing `r` in `[0, total)` and subtracting weights in order until the
/// remainder reaches zero is inverse-CDF sampling over the weights; any fixed
/// order gives the same distribution.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    entries: Vec<(Symbol, u64)>,
    total: u64,
}

impl WeightedSampler {
    pub fn new(symbols: &[Symbol], weights: &WeightTable) -> SlotResult<Self> {
        validate_weights(symbols, weights)?;
        let entries: Vec<(Symbol, u64)> = symbols
            .iter()
            .filter_map(|s| weights.get(s).map(|w| (s.clone(), w as u64)))
            .collect();
        let total = entries.iter().map(|(_, w)| w).sum();
        Ok(Self { entries, total })
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn sample<R: RandomSource + ?Sized>(&self, rng: &mut R) -> &Symbol {
        let mut r = rng.next_unit() * self.total as f64;
        for (sym, weight) in &self.entries {
            r -= *weight as f64;
            if r <= 0.0 {
                return sym;
            }
        }
        // Rounding can leave a sliver above zero after the last weight.
        &self.entries[self.entries.len() - 1].0
    }

    pub fn sample_reel<R: RandomSource + ?Sized>(
        &self,
        reel_count: usize,
        rng: &mut R,
    ) -> ReelOutcome {
        (0..reel_count)
            .map(|_| self.sample(rng).clone())
            .collect::<Vec<_>>()
            .into()
    }
}

/// Draw one symbol.
pub fn draw<R: RandomSource + ?Sized>(
    symbols: &[Symbol],
    weights: &WeightTable,
    rng: &mut R,
) -> SlotResult<Symbol> {
    let sampler = WeightedSampler::new(symbols, weights)?;
    Ok(sampler.sample(rng).clone())
}

/// Draw `reel_count` symbols independently, with replacement.
pub fn draw_reel<R: RandomSource + ?Sized>(
    symbols: &[Symbol],
    weights: &WeightTable,
    reel_count: usize,
    rng: &mut R,
) -> SlotResult<ReelOutcome> {
    if reel_count == 0 {
        return Err(SlotError::argument("reel count must be positive"));
    }
    let sampler = WeightedSampler::new(symbols, weights)?;
    Ok(sampler.sample_reel(reel_count, rng))
}
