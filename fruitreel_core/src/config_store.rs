use crate::analytics::{summarize, ConfigurationSummary};
use crate::engine::SlotConfig;
use crate::error::SlotResult;
use crate::paytable::{PayoutTable, WeightTable};
use crate::symbols::Symbol;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// A configuration together with its analysis, ready to be installed.
#[derive(Debug, Clone)]
pub struct PreparedConfig {
    config: Arc<SlotConfig>,
    summary: Arc<ConfigurationSummary>,
}

impl PreparedConfig {
    /// Analyse `config`. Fails if it is too large for exact analysis.
    pub fn new(config: SlotConfig) -> SlotResult<Self> {
        let summary = summarize(&config)?;
        Ok(Self {
            config: Arc::new(config),
            summary: Arc::new(summary),
        })
    }

    pub fn config(&self) -> &Arc<SlotConfig> {
        &self.config
    }

    pub fn summary(&self) -> &Arc<ConfigurationSummary> {
        &self.summary
    }
}

/// Owner of the active machine configuration.
///
/// Readers take an `Arc` snapshot and compute without holding the lock. The
/// summary is computed once per configuration, before it is installed, and
/// always swaps together with it: a reader sees either the old weights with
/// the old payouts or the new weights with the new payouts.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<PreparedConfig>,
}

impl ConfigStore {
    pub fn new(config: SlotConfig) -> SlotResult<Self> {
        Ok(Self {
            current: RwLock::new(PreparedConfig::new(config)?),
        })
    }

    pub fn snapshot(&self) -> Arc<SlotConfig> {
        self.current.read().config.clone()
    }

    pub fn summary(&self) -> Arc<ConfigurationSummary> {
        self.current.read().summary.clone()
    }

    /// Build and analyse a replacement from both tables without installing it.
    ///
    /// Symbols already configured keep their display order; new symbols follow
    /// in table order. The reel count carries over.
    pub fn prepare_update(
        &self,
        weights: WeightTable,
        payouts: PayoutTable,
    ) -> SlotResult<PreparedConfig> {
        let current = self.snapshot();
        let symbols = merged_order(current.symbols(), &weights);
        let prepared = SlotConfig::new(symbols, weights, payouts, current.reel_count())
            .and_then(PreparedConfig::new);
        if let Err(e) = &prepared {
            warn!(error = %e, "rejected slot configuration update");
        }
        prepared
    }

    /// Make `prepared` the active configuration.
    pub fn install(&self, prepared: PreparedConfig) -> Arc<SlotConfig> {
        let next = prepared.config.clone();
        *self.current.write() = prepared;
        info!(symbols = next.symbols().len(), "slot configuration updated");
        next
    }

    /// Analyse and install `config`. On error the active configuration is untouched.
    pub fn replace(&self, config: SlotConfig) -> SlotResult<Arc<SlotConfig>> {
        Ok(self.install(PreparedConfig::new(config)?))
    }

    /// Replace both tables at once. On error the active configuration is untouched.
    pub fn update_configuration(
        &self,
        weights: WeightTable,
        payouts: PayoutTable,
    ) -> SlotResult<Arc<SlotConfig>> {
        Ok(self.install(self.prepare_update(weights, payouts)?))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(SlotConfig::default_fruit()).expect("default machine is analysable")
    }
}

fn merged_order(previous: &[Symbol], weights: &WeightTable) -> Vec<Symbol> {
    let mut order: Vec<Symbol> = previous
        .iter()
        .filter(|s| weights.contains(s))
        .cloned()
        .collect();
    for sym in weights.symbols() {
        if !previous.contains(sym) {
            order.push(sym.clone());
        }
    }
    order
}
