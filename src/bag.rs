use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Synchronized key-value state owned by one [`Group`](crate::Group) and
/// shared by that group's running tasks.
///
/// Values are JSON. `Value::Null` is never stored: setting a null removes
/// the key, so "present" and "has a value" are the same question and
/// readers never see an explicit null.
#[derive(Debug, Default)]
pub struct Bag {
    data: DashMap<String, Value>,
}

impl Bag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value, or `None` when the key is unset.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Stores a value, replacing any previous one for the key. Storing
    /// `Value::Null` removes the key instead.
    pub fn set(&self, key: &str, value: Value) {
        if value.is_null() {
            self.data.remove(key);
        } else {
            self.data.insert(key.to_string(), value);
        }
    }

    /// Removes the key. No-op when absent.
    pub fn remove(&self, key: &str) {
        self.data.remove(key);
    }

    /// One-directional, gap-filling merge: every non-null value in `other`
    /// is copied into `self` only where `self` has no value for that key.
    /// The donor is left unchanged, and values the receiver already holds
    /// are never overwritten, so repeated absorbs of the same donor are
    /// idempotent.
    ///
    /// Only ever invoked forward along a chain, receiver absorbing donor,
    /// so the shard locks of the two maps cannot form a cycle.
    pub fn absorb(&self, other: &Bag) {
        for entry in other.data.iter() {
            if entry.value().is_null() {
                continue;
            }
            self.data
                .entry(entry.key().clone())
                .or_insert_with(|| entry.value().clone());
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Point-in-time copy of the contents, for inspection and logging.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
