use crate::error::{SlotError, SlotResult};
use crate::symbols::{default_symbols, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Relative draw frequency per symbol. Not normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightTable(BTreeMap<Symbol, u32>);

/// Bet multiplier per symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutTable(BTreeMap<Symbol, u32>);

macro_rules! symbol_table {
    ($name:ident) => {
        impl $name {
            pub fn from_pairs<S, I>(pairs: I) -> Self
            where
                S: Into<Symbol>,
                I: IntoIterator<Item = (S, u32)>,
            {
                Self(pairs.into_iter().map(|(s, v)| (s.into(), v)).collect())
            }

            pub fn get(&self, symbol: &Symbol) -> Option<u32> {
                self.0.get(symbol).copied()
            }

            pub fn contains(&self, symbol: &Symbol) -> bool {
                self.0.contains_key(symbol)
            }

            pub fn iter(&self) -> impl Iterator<Item = (&Symbol, u32)> {
                self.0.iter().map(|(s, v)| (s, *v))
            }

            pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
                self.0.keys()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl FromIterator<(Symbol, u32)> for $name {
            fn from_iter<I: IntoIterator<Item = (Symbol, u32)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

symbol_table!(WeightTable);
symbol_table!(PayoutTable);

impl WeightTable {
    pub fn default_fruit() -> Self {
        default_symbols()
            .into_iter()
            .zip([30u32, 25, 20, 15, 5, 3, 2])
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.0.values().map(|&w| w as u64).sum()
    }
}

impl PayoutTable {
    pub fn default_fruit() -> Self {
        default_symbols()
            .into_iter()
            .zip([2u32, 3, 4, 5, 10, 20, 50])
            .collect()
    }
}

fn check_symbol_set(symbols: &[Symbol]) -> SlotResult<()> {
    if symbols.is_empty() {
        return Err(SlotError::config("symbol set is empty"));
    }
    let mut seen = HashSet::with_capacity(symbols.len());
    for sym in symbols {
        if !seen.insert(sym) {
            return Err(SlotError::config(format!("symbol {sym} listed twice")));
        }
    }
    Ok(())
}

/// Every symbol has a positive weight and the table holds nothing else.
pub fn validate_weights(symbols: &[Symbol], weights: &WeightTable) -> SlotResult<()> {
    check_symbol_set(symbols)?;
    for sym in symbols {
        match weights.get(sym) {
            None => return Err(SlotError::config(format!("symbol {sym} has no weight"))),
            Some(0) => {
                return Err(SlotError::config(format!(
                    "weight for symbol {sym} must be positive"
                )))
            }
            Some(_) => {}
        }
    }
    if weights.len() != symbols.len() {
        return Err(SlotError::config(
            "weight table lists symbols outside the configured set",
        ));
    }
    Ok(())
}

/// Every symbol has a positive multiplier and the table holds nothing else.
pub fn validate_payouts(symbols: &[Symbol], payouts: &PayoutTable) -> SlotResult<()> {
    check_symbol_set(symbols)?;
    for sym in symbols {
        match payouts.get(sym) {
            None => {
                return Err(SlotError::config(format!(
                    "symbol {sym} has no payout multiplier"
                )))
            }
            Some(0) => {
                return Err(SlotError::config(format!(
                    "multiplier for symbol {sym} must be positive"
                )))
            }
            Some(_) => {}
        }
    }
    if payouts.len() != symbols.len() {
        return Err(SlotError::config(
            "payout table lists symbols outside the configured set",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_cover_default_symbols() {
        let symbols = default_symbols();
        validate_weights(&symbols, &WeightTable::default_fruit()).unwrap();
        validate_payouts(&symbols, &PayoutTable::default_fruit()).unwrap();
        assert_eq!(WeightTable::default_fruit().total(), 100);
    }

    #[test]
    fn zero_weight_rejected() {
        let symbols: Vec<Symbol> = vec!["a".into(), "b".into()];
        let weights = WeightTable::from_pairs([("a", 3), ("b", 0)]);
        assert!(matches!(
            validate_weights(&symbols, &weights),
            Err(SlotError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_and_extra_entries_rejected() {
        let symbols: Vec<Symbol> = vec!["a".into(), "b".into()];
        let missing = PayoutTable::from_pairs([("a", 3)]);
        let extra = PayoutTable::from_pairs([("a", 3), ("b", 4), ("c", 5)]);
        assert!(validate_payouts(&symbols, &missing).is_err());
        assert!(validate_payouts(&symbols, &extra).is_err());
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let symbols: Vec<Symbol> = vec!["a".into(), "a".into()];
        let weights = WeightTable::from_pairs([("a", 3)]);
        assert!(validate_weights(&symbols, &weights).is_err());
    }
}
