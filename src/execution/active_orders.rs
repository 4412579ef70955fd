use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Symbols that currently have a live order
///
/// Cloneable; all clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct ActiveOrders {
    symbols: Arc<RwLock<HashSet<String>>>,
}

impl ActiveOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a symbol as having a live order; false if it already had one
    pub fn insert(&self, symbol: &str) -> bool {
        self.symbols
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string())
    }

    pub fn remove(&self, symbol: &str) -> bool {
        self.symbols
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(symbol)
    }

    /// Point-in-time copy for a nomination cycle
    pub fn snapshot(&self) -> HashSet<String> {
        self.symbols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.symbols.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let orders = ActiveOrders::new();
        let other = orders.clone();

        assert!(orders.insert("BTCUSDT"));
        assert!(!other.insert("BTCUSDT"));
        assert!(other.contains("BTCUSDT"));
        assert_eq!(orders.len(), 1);

        assert!(other.remove("BTCUSDT"));
        assert!(orders.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let orders = ActiveOrders::new();
        orders.insert("ETHUSDT");
        let snapshot = orders.snapshot();
        orders.insert("SOLUSDT");

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("ETHUSDT"));
    }
}
