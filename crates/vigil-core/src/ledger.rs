//! Append-only ledger of consumed identifiers
//!
//! Entries are never evicted. A consumed identifier stays consumed for the
//! lifetime of the owning state machine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

use crate::types::OperationId;

/// Set of consumed identifiers, remembering consumption order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<K>", into = "Vec<K>")]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash + Copy",
    deserialize = "K: Deserialize<'de> + Eq + Hash + Copy"
))]
pub struct OperationLedger<K = OperationId>
where
    K: Eq + Hash + Copy,
{
    index: HashSet<K>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Copy> Default for OperationLedger<K> {
    fn default() -> Self {
        Self {
            index: HashSet::new(),
            order: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Copy> OperationLedger<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from identifiers in consumption order
    pub fn from_entries(entries: Vec<K>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.record(entry);
        }
        ledger
    }

    pub fn contains(&self, id: &K) -> bool {
        self.index.contains(id)
    }

    /// Consume `id`; returns false if it was already consumed
    pub fn record(&mut self, id: K) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.index.insert(id);
        self.order.push(id);
        true
    }

    /// Identifiers in the order they were consumed
    pub fn entries(&self) -> &[K] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<K: Eq + Hash + Copy> From<Vec<K>> for OperationLedger<K> {
    fn from(entries: Vec<K>) -> Self {
        Self::from_entries(entries)
    }
}

impl<K: Eq + Hash + Copy> From<OperationLedger<K>> for Vec<K> {
    fn from(ledger: OperationLedger<K>) -> Self {
        ledger.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_once() {
        let mut ledger = OperationLedger::new();
        let op = OperationId::new([1; 32]);

        assert!(!ledger.contains(&op));
        assert!(ledger.record(op));
        assert!(ledger.contains(&op));
        assert!(!ledger.record(op));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_entries_keep_order() {
        let ops: Vec<OperationId> = (0..5u8).map(|i| OperationId::new([i; 32])).collect();
        let ledger = OperationLedger::from_entries(ops.clone());
        assert_eq!(ledger.entries(), ops.as_slice());
    }

    #[test]
    fn test_deserialized_ledger_still_rejects() {
        let mut ledger = OperationLedger::new();
        ledger.record(OperationId::new([7; 32]));

        let json = serde_json::to_string(&ledger).unwrap();
        let mut restored: OperationLedger = serde_json::from_str(&json).unwrap();
        assert!(restored.contains(&OperationId::new([7; 32])));
        assert!(!restored.record(OperationId::new([7; 32])));
    }
}
