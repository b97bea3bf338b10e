use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_REEL_COUNT: usize = 3;

/// Opaque symbol token, e.g. "🍒".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(token: impl Into<String>) -> Self {
        Symbol(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(token: &str) -> Self {
        Symbol::new(token)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Default fruit set, most common first.
pub fn default_symbols() -> Vec<Symbol> {
    ["🍒", "🍋", "🍊", "🍇", "🔔", "⭐", "💎"]
        .into_iter()
        .map(Symbol::from)
        .collect()
}

/// One spin's symbols, one per reel, left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReelOutcome(Vec<Symbol>);

impl ReelOutcome {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        ReelOutcome(symbols)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Occurrence count per distinct symbol, in order of first appearance.
    pub fn counts(&self) -> Vec<(&Symbol, usize)> {
        let mut order: Vec<(&Symbol, usize)> = Vec::new();
        let mut index: HashMap<&Symbol, usize> = HashMap::new();
        for sym in &self.0 {
            match index.get(sym) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(sym, order.len());
                    order.push((sym, 1));
                }
            }
        }
        order
    }

    pub fn into_inner(self) -> Vec<Symbol> {
        self.0
    }
}

impl From<Vec<Symbol>> for ReelOutcome {
    fn from(symbols: Vec<Symbol>) -> Self {
        ReelOutcome(symbols)
    }
}
