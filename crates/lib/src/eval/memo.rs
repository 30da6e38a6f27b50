//! At-most-once memoization with request tracking.

use std::hash::Hash;

use dashmap::{DashMap, DashSet};

use super::Lookup;

/// A concurrent memo table keyed by content.
///
/// [`MemoTable::lookup`] either returns a computed value or records the key as
/// requested and returns [`Lookup::Pending`]. [`MemoTable::settle`] computes every
/// requested key. A value is computed at most once per table: concurrent
/// requesters of the same key wait on the shard lock instead of computing it
/// again, so `compute` must not re-enter the same table.
#[derive(Debug)]
pub struct MemoTable<K: Eq + Hash, V> {
  values: DashMap<K, V>,
  requested: DashSet<K>,
}

impl<K: Eq + Hash, V> Default for MemoTable<K, V> {
  fn default() -> Self {
    Self {
      values: DashMap::new(),
      requested: DashSet::new(),
    }
  }
}

impl<K, V> MemoTable<K, V>
where
  K: Eq + Hash + Clone,
  V: Clone,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the value for `key`, or record it as requested.
  pub fn lookup(&self, key: &K) -> Lookup<V> {
    if let Some(value) = self.values.get(key) {
      return Lookup::Ready(value.value().clone());
    }
    self.requested.insert(key.clone());
    Lookup::Pending
  }

  /// Return the value for `key` without recording a request.
  pub fn get(&self, key: &K) -> Option<V> {
    self.values.get(key).map(|value| value.value().clone())
  }

  /// Return the value for `key`, computing it now if needed.
  pub fn get_or_compute(&self, key: &K, compute: impl FnOnce(&K) -> V) -> V {
    if let Some(value) = self.values.get(key) {
      return value.value().clone();
    }
    self
      .values
      .entry(key.clone())
      .or_insert_with(|| compute(key))
      .value()
      .clone()
  }

  /// Store a value directly.
  pub fn insert(&self, key: K, value: V) {
    self.values.insert(key, value);
  }

  /// Compute every requested key. Returns how many values were produced.
  pub fn settle(&self, mut compute: impl FnMut(&K) -> V) -> usize {
    let keys: Vec<K> = self.requested.iter().map(|key| key.key().clone()).collect();
    let mut produced = 0;
    for key in keys {
      self.requested.remove(&key);
      if self.values.contains_key(&key) {
        continue;
      }
      self.values.entry(key.clone()).or_insert_with(|| {
        produced += 1;
        compute(&key)
      });
    }
    produced
  }

  /// Number of keys requested but not computed yet.
  pub fn pending_count(&self) -> usize {
    self.requested.len()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Drop every value and request.
  pub fn clear(&self) {
    self.values.clear();
    self.requested.clear();
  }
}
