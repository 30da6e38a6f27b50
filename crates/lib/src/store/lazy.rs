//! Eager-or-deferred memo table shared by the in-memory stores.

use std::hash::Hash;

use crate::eval::{Lookup, MemoTable};

/// A [`MemoTable`] that either computes on first request or only records
/// the request until [`LazyTable::settle`].
pub(crate) struct LazyTable<K: Eq + Hash, V> {
  memo: MemoTable<K, V>,
  deferred: bool,
}

impl<K, V> LazyTable<K, V>
where
  K: Eq + Hash + Clone,
  V: Clone,
{
  pub fn new(deferred: bool) -> Self {
    Self {
      memo: MemoTable::new(),
      deferred,
    }
  }

  pub fn is_deferred(&self) -> bool {
    self.deferred
  }

  pub fn get(&self, key: &K, compute: impl FnOnce(&K) -> V) -> Lookup<V> {
    if self.deferred {
      self.memo.lookup(key)
    } else {
      Lookup::Ready(self.memo.get_or_compute(key, compute))
    }
  }

  /// Compute now regardless of mode.
  pub fn get_or_compute(&self, key: &K, compute: impl FnOnce(&K) -> V) -> V {
    self.memo.get_or_compute(key, compute)
  }

  pub fn settle(&self, compute: impl FnMut(&K) -> V) -> usize {
    self.memo.settle(compute)
  }

  pub fn pending(&self) -> usize {
    self.memo.pending_count()
  }

  pub fn len(&self) -> usize {
    self.memo.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn eager_tables_compute_on_request() {
    let table: LazyTable<u32, u32> = LazyTable::new(false);
    assert_eq!(table.get(&3, |k| k * 2), Lookup::Ready(6));
    assert_eq!(table.pending(), 0);
  }

  #[test]
  fn deferred_tables_wait_for_settle() {
    let table: LazyTable<u32, u32> = LazyTable::new(true);
    assert!(table.get(&3, |k| k * 2).is_pending());
    assert_eq!(table.pending(), 1);
    assert_eq!(table.settle(|k| k * 2), 1);
    assert_eq!(table.get(&3, |_| unreachable!()), Lookup::Ready(6));
  }
}
