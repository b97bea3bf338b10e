//! Return-to-player analytics.
//!
//! Three views of the same machine:
//! - [`theoretical_rtp`]: closed-form approximation from weights and multipliers,
//! - [`exact_rtp`]: every reel outcome scored by the evaluator and weighted by its probability,
//! - [`simulate`] / [`simulate_parallel`]: Monte Carlo over actual spins.
//!
//! The closed form counts, per symbol `s`, "exactly k of n reels show `s`" with
//! the binomial `C(n,k)·p^k·(1−p)^(n−k)` and pays `m(s)` for partial lines and
//! `2·m(s)` for a full line. With three reels this is `3p²(1−p)·m + p³·2m`.
//! For more reels it over-counts outcomes where two symbols pair up, because only
//! one of them actually scores; the figure is kept as the published approximation.

use crate::engine::SlotConfig;
use crate::error::{SlotError, SlotResult};
use crate::evaluator::evaluate;
use crate::paytable::{PayoutTable, WeightTable};
use crate::rng::{RandomSource, RngSource};
use crate::symbols::{ReelOutcome, Symbol, DEFAULT_REEL_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Spins per simulation shard. Fixed so a seed gives the same result on any thread count.
pub const SHARD_SPINS: u64 = 10_000;

/// Runs at or above this size are considered large enough to compare against theory.
pub const SUFFICIENT_SAMPLE: u64 = 10_000;

/// Σ weight/total over the table. 1.0 up to rounding for any non-empty table.
pub fn probability_sum(weights: &WeightTable) -> f64 {
    let total = weights.total() as f64;
    weights.iter().map(|(_, w)| w as f64 / total).sum()
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn approximate_rtp<I>(terms: I, reel_count: usize) -> f64
where
    I: IntoIterator<Item = (f64, u32)>,
{
    if reel_count < 2 {
        return 0.0;
    }
    let n = reel_count;
    let per_unit: f64 = terms
        .into_iter()
        .map(|(p, multiplier)| {
            let m = multiplier as f64;
            let partial: f64 = (2..n)
                .map(|k| binomial(n, k) * p.powi(k as i32) * (1.0 - p).powi((n - k) as i32))
                .sum();
            partial * m + p.powi(n as i32) * m * 2.0
        })
        .sum();
    per_unit * 100.0
}

/// Theoretical RTP in percent for a three-reel machine.
///
/// `bet_amount` does not change the figure (multipliers are bet multiples) but
/// is validated like every other bet.
pub fn theoretical_rtp(
    symbols: &[Symbol],
    weights: &WeightTable,
    payouts: &PayoutTable,
    bet_amount: i64,
) -> SlotResult<f64> {
    if bet_amount < 0 {
        return Err(SlotError::argument(format!(
            "bet amount must not be negative, got {bet_amount}"
        )));
    }
    let config = SlotConfig::new(
        symbols.to_vec(),
        weights.clone(),
        payouts.clone(),
        DEFAULT_REEL_COUNT,
    )?;
    Ok(theoretical_rtp_for(&config))
}

/// Theoretical RTP in percent for the configuration's own reel count.
pub fn theoretical_rtp_for(config: &SlotConfig) -> f64 {
    let terms = config
        .probabilities()
        .into_iter()
        .map(|(sym, p)| (p, config.payouts().get(&sym).unwrap_or(0)));
    approximate_rtp(terms, config.reel_count())
}

/// Largest number of outcome classes [`exact_rtp`] and [`win_probability`] will enumerate.
pub const MAX_EXACT_OUTCOMES: u64 = 50_000;

/// Number of distinct symbol multisets on `reel_count` reels: C(symbols + reels − 1, reels).
/// Saturates at `u64::MAX`.
pub fn outcome_class_count(symbol_count: usize, reel_count: usize) -> u64 {
    if symbol_count == 0 {
        return 0;
    }
    let n = (symbol_count + reel_count - 1) as u128;
    let mut acc: u128 = 1;
    for i in 0..reel_count as u128 {
        // acc = C(n - reel_count + i + 1, i + 1), always an integer
        acc = acc * (n - reel_count as u128 + 1 + i) / (i + 1);
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

/// Calls `visit` with every multiset of reel symbols (as a canonical outcome)
/// and the probability of drawing it in any order.
fn for_each_outcome_class<F>(config: &SlotConfig, mut visit: F) -> SlotResult<()>
where
    F: FnMut(&ReelOutcome, f64) -> SlotResult<()>,
{
    let probs = config.probabilities();
    let n = config.reel_count();
    let classes = outcome_class_count(probs.len(), n);
    if classes > MAX_EXACT_OUTCOMES {
        return Err(SlotError::config(format!(
            "{} symbols on {n} reels give {classes} outcome classes, exact analysis allows {MAX_EXACT_OUTCOMES}",
            probs.len()
        )));
    }
    let mut counts = vec![0usize; probs.len()];

    fn factorial(k: usize) -> f64 {
        (1..=k).fold(1.0, |acc, i| acc * i as f64)
    }

    fn recurse<F>(
        probs: &[(Symbol, f64)],
        counts: &mut [usize],
        idx: usize,
        remaining: usize,
        n: usize,
        visit: &mut F,
    ) -> SlotResult<()>
    where
        F: FnMut(&ReelOutcome, f64) -> SlotResult<()>,
    {
        if idx == probs.len() - 1 {
            counts[idx] = remaining;
            let mut prob = factorial(n);
            let mut reels = Vec::with_capacity(n);
            for ((sym, p), &c) in probs.iter().zip(counts.iter()) {
                prob *= p.powi(c as i32) / factorial(c);
                reels.extend(std::iter::repeat(sym.clone()).take(c));
            }
            return visit(&ReelOutcome::new(reels), prob);
        }
        for c in 0..=remaining {
            counts[idx] = c;
            recurse(probs, counts, idx + 1, remaining - c, n, visit)?;
        }
        Ok(())
    }

    recurse(&probs, &mut counts, 0, n, n, &mut visit)
}

/// Exact RTP in percent: every outcome scored by the evaluator.
pub fn exact_rtp(config: &SlotConfig) -> SlotResult<f64> {
    let mut expected = 0.0;
    for_each_outcome_class(config, |outcome, prob| {
        expected += evaluate(outcome, 1, config.payouts())? as f64 * prob;
        Ok(())
    })?;
    Ok(expected * 100.0)
}

/// Probability in percent that a spin pays anything.
pub fn win_probability(config: &SlotConfig) -> SlotResult<f64> {
    let mut winning = 0.0;
    for_each_outcome_class(config, |outcome, prob| {
        if evaluate(outcome, 1, config.payouts())? > 0 {
            winning += prob;
        }
        Ok(())
    })?;
    Ok(winning * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub symbol: Symbol,
    pub weight: u32,
    pub probability: f64,
    pub payout_multiplier: u32,
    /// probability × multiplier
    pub expected_contribution: f64,
    /// 1 = most frequent; equal weights share a rank.
    pub frequency_rank: usize,
}

pub fn symbol_analysis(config: &SlotConfig) -> Vec<SymbolAnalysis> {
    let total = config.total_weight() as f64;
    let weights = config.weights();
    config
        .symbols()
        .iter()
        .map(|sym| {
            let weight = weights.get(sym).unwrap_or(0);
            let multiplier = config.payouts().get(sym).unwrap_or(0);
            let probability = weight as f64 / total;
            let frequency_rank = 1 + weights.iter().filter(|(_, w)| *w > weight).count();
            SymbolAnalysis {
                symbol: sym.clone(),
                weight,
                probability,
                payout_multiplier: multiplier,
                expected_contribution: probability * multiplier as f64,
                frequency_rank,
            }
        })
        .collect()
}

/// Everything the admin view shows about a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub symbols: Vec<Symbol>,
    pub weights: WeightTable,
    pub probabilities: BTreeMap<Symbol, f64>,
    pub payouts: PayoutTable,
    pub reel_count: usize,
    pub theoretical_rtp: f64,
    pub exact_rtp: f64,
    pub win_probability: f64,
    pub symbol_analysis: Vec<SymbolAnalysis>,
}

pub fn summarize(config: &SlotConfig) -> SlotResult<ConfigurationSummary> {
    Ok(ConfigurationSummary {
        symbols: config.symbols().to_vec(),
        weights: config.weights().clone(),
        probabilities: config.probabilities().into_iter().collect(),
        payouts: config.payouts().clone(),
        reel_count: config.reel_count(),
        theoretical_rtp: theoretical_rtp_for(config),
        exact_rtp: exact_rtp(config)?,
        win_probability: win_probability(config)?,
        symbol_analysis: symbol_analysis(config),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Spins requested.
    pub total_spins: u64,
    /// Spins actually played; lower than `total_spins` only when interrupted.
    pub completed_spins: u64,
    pub interrupted: bool,
    pub total_bet: u64,
    pub total_payout: u64,
    pub net_result: i64,
    pub win_count: u64,
    pub win_rate: f64,
    pub actual_rtp: f64,
    pub biggest_win: u64,
    pub average_win: f64,
    /// payout / bet → number of spins that paid it
    pub win_distribution: BTreeMap<u64, u64>,
    pub theoretical_rtp: f64,
    /// actual − theoretical
    pub rtp_difference: f64,
    pub rtp_difference_abs: f64,
    pub sample_size_sufficient: bool,
}

#[derive(Debug, Default, Clone)]
struct Tally {
    spins: u64,
    total_payout: u64,
    wins: u64,
    biggest_win: u64,
    distribution: BTreeMap<u64, u64>,
}

impl Tally {
    fn record(&mut self, payout: u64, bet: u64) -> SlotResult<()> {
        self.spins += 1;
        self.total_payout = add_payout(self.total_payout, payout)?;
        if payout > 0 {
            self.wins += 1;
            self.biggest_win = self.biggest_win.max(payout);
            *self.distribution.entry(payout / bet).or_insert(0) += 1;
        }
        Ok(())
    }

    fn merge(mut self, other: Tally) -> SlotResult<Tally> {
        self.spins += other.spins;
        self.total_payout = add_payout(self.total_payout, other.total_payout)?;
        self.wins += other.wins;
        self.biggest_win = self.biggest_win.max(other.biggest_win);
        for (tier, n) in other.distribution {
            *self.distribution.entry(tier).or_insert(0) += n;
        }
        Ok(self)
    }

    fn into_stats(self, requested: u64, bet: u64, theoretical_rtp: f64) -> SlotResult<SimulationStats> {
        // spins <= requested, and requested × bet was checked to fit an i64
        let total_bet = self.spins * bet;
        let net_result = i64::try_from(self.total_payout as i128 - total_bet as i128)
            .map_err(|_| SlotError::argument("simulation net result overflows"))?;
        let ratio = |num: f64, den: u64| if den > 0 { num / den as f64 * 100.0 } else { 0.0 };
        let actual_rtp = ratio(self.total_payout as f64, total_bet);
        Ok(SimulationStats {
            total_spins: requested,
            completed_spins: self.spins,
            interrupted: self.spins < requested,
            total_bet,
            total_payout: self.total_payout,
            net_result,
            win_count: self.wins,
            win_rate: ratio(self.wins as f64, self.spins),
            actual_rtp,
            biggest_win: self.biggest_win,
            average_win: if self.wins > 0 {
                self.total_payout as f64 / self.wins as f64
            } else {
                0.0
            },
            win_distribution: self.distribution,
            theoretical_rtp,
            rtp_difference: actual_rtp - theoretical_rtp,
            rtp_difference_abs: (actual_rtp - theoretical_rtp).abs(),
            sample_size_sufficient: self.spins >= SUFFICIENT_SAMPLE,
        })
    }
}

fn add_payout(total: u64, payout: u64) -> SlotResult<u64> {
    total
        .checked_add(payout)
        .ok_or_else(|| SlotError::argument("total simulated payout overflows"))
}

fn check_simulation_args(num_spins: u64, bet_amount: i64) -> SlotResult<u64> {
    if num_spins == 0 {
        return Err(SlotError::argument("number of spins must be positive"));
    }
    if bet_amount <= 0 {
        return Err(SlotError::argument(format!(
            "bet amount must be positive, got {bet_amount}"
        )));
    }
    let bet = bet_amount as u64;
    if num_spins.checked_mul(bet).map_or(true, |total| total > i64::MAX as u64) {
        return Err(SlotError::argument(format!(
            "total wager of {num_spins} spins at {bet_amount} overflows"
        )));
    }
    Ok(bet)
}

fn play<R: RandomSource + ?Sized>(
    config: &SlotConfig,
    spins: u64,
    bet: u64,
    rng: &mut R,
    cancel: Option<&AtomicBool>,
) -> SlotResult<Tally> {
    let mut tally = Tally::default();
    for _ in 0..spins {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            break;
        }
        let outcome = config.spin_reels(rng);
        let payout = evaluate(&outcome, bet as i64, config.payouts())?;
        tally.record(payout, bet)?;
    }
    Ok(tally)
}

/// Monte Carlo over `num_spins` three-reel spins.
pub fn simulate<R: RandomSource + ?Sized>(
    num_spins: u64,
    bet_amount: i64,
    symbols: &[Symbol],
    weights: &WeightTable,
    payouts: &PayoutTable,
    rng: &mut R,
) -> SlotResult<SimulationStats> {
    check_simulation_args(num_spins, bet_amount)?;
    let config = SlotConfig::new(
        symbols.to_vec(),
        weights.clone(),
        payouts.clone(),
        DEFAULT_REEL_COUNT,
    )?;
    simulate_config(&config, num_spins, bet_amount, rng, None)
}

/// Sequential simulation on a validated configuration. `cancel` is polled between spins.
pub fn simulate_config<R: RandomSource + ?Sized>(
    config: &SlotConfig,
    num_spins: u64,
    bet_amount: i64,
    rng: &mut R,
    cancel: Option<&AtomicBool>,
) -> SlotResult<SimulationStats> {
    let bet = check_simulation_args(num_spins, bet_amount)?;
    debug!(num_spins, bet, "simulation started");
    let tally = play(config, num_spins, bet, rng, cancel)?;
    let stats = tally.into_stats(num_spins, bet, theoretical_rtp_for(config))?;
    debug!(
        completed = stats.completed_spins,
        actual_rtp = stats.actual_rtp,
        "simulation finished"
    );
    Ok(stats)
}

/// Sharded simulation on the rayon pool.
///
/// Shard `i` plays up to [`SHARD_SPINS`] spins on ChaCha stream `i` of `seed`;
/// shard tallies are summed. The result depends only on `seed`, never on the
/// number of worker threads.
pub fn simulate_parallel(
    config: &SlotConfig,
    num_spins: u64,
    bet_amount: i64,
    seed: u64,
    cancel: Option<&AtomicBool>,
) -> SlotResult<SimulationStats> {
    let bet = check_simulation_args(num_spins, bet_amount)?;
    let shards = num_spins.div_ceil(SHARD_SPINS);
    debug!(num_spins, bet, shards, "parallel simulation started");

    let tally = (0..shards)
        .into_par_iter()
        .map(|shard| {
            let spins = SHARD_SPINS.min(num_spins - shard * SHARD_SPINS);
            let mut rng = RngSource::seeded_stream(seed, shard);
            play(config, spins, bet, &mut rng, cancel)
        })
        .try_reduce(Tally::default, Tally::merge)?;

    let stats = tally.into_stats(num_spins, bet, theoretical_rtp_for(config))?;
    debug!(
        completed = stats.completed_spins,
        actual_rtp = stats.actual_rtp,
        interrupted = stats.interrupted,
        "parallel simulation finished"
    );
    Ok(stats)
}
