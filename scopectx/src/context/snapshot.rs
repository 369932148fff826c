//! Insertion-ordered key/value snapshot shared copy-on-write between branches.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    value: Value,
}

/// One branch's view of a single context.
///
/// Snapshots are held behind `Arc` and mutated through `Arc::make_mut`, so a
/// snapshot still referenced by another branch is cloned before the write.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    entries: HashMap<String, Slot>,
    next_seq: u64,
}

impl Snapshot {
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or overwrites a value. Overwrites keep the original position.
    pub(crate) fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        if let Some(slot) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, Slot { seq, value });
        None
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in insertion order.
    pub(crate) fn ordered(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, slot)| slot.seq);
        entries
            .into_iter()
            .map(|(key, slot)| (key, &slot.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let mut snapshot = Snapshot::default();
        assert_eq!(snapshot.insert("a".to_string(), json!(1)), None);
        assert_eq!(snapshot.get("a"), Some(&json!(1)));
        assert!(snapshot.contains_key("a"));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut snapshot = Snapshot::default();
        snapshot.insert("a".to_string(), json!(1));
        snapshot.insert("b".to_string(), json!(2));
        assert_eq!(snapshot.insert("a".to_string(), json!(3)), Some(json!(1)));

        let keys: Vec<_> = snapshot.ordered().into_iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_reinsert_after_remove_moves_to_end() {
        let mut snapshot = Snapshot::default();
        snapshot.insert("a".to_string(), json!(1));
        snapshot.insert("b".to_string(), json!(2));
        assert_eq!(snapshot.remove("a"), Some(json!(1)));
        snapshot.insert("a".to_string(), json!(4));

        let keys: Vec<_> = snapshot.ordered().into_iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Snapshot::default();
        original.insert("k".to_string(), json!("v"));

        let mut copy = original.clone();
        copy.remove("k");

        assert!(original.contains_key("k"));
        assert!(!copy.contains_key("k"));
    }
}
