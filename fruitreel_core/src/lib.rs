pub mod analytics;
pub mod config_store;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod paytable;
pub mod rng;
pub mod sampler;
pub mod symbols;

pub use crate::analytics::{
    exact_rtp, outcome_class_count, simulate, simulate_config, simulate_parallel, summarize,
    symbol_analysis, theoretical_rtp, theoretical_rtp_for, win_probability, ConfigurationSummary,
    SimulationStats, SymbolAnalysis, MAX_EXACT_OUTCOMES,
};
pub use crate::config_store::{ConfigStore, PreparedConfig};
pub use crate::engine::{replay_spin, spin_once, SlotConfig, SpinResult};
pub use crate::error::{SlotError, SlotResult};
pub use crate::evaluator::{evaluate, score, WinningCombination};
pub use crate::paytable::{PayoutTable, WeightTable};
pub use crate::rng::{RandomSource, RngSource, ScriptedSource};
pub use crate::sampler::{draw, draw_reel, WeightedSampler};
pub use crate::symbols::{default_symbols, ReelOutcome, Symbol, DEFAULT_REEL_COUNT};
