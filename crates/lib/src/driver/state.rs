//! Generation-scoped driver bookkeeping.
//!
//! Restarts re-run a driver evaluation from its start, so anything that must
//! happen once per key lives here instead of in the evaluation itself:
//!
//! - posted events, per key and event kind
//! - keys already checked for action conflicts
//! - per-key retained state (test type, compatibility outcome)
//!
//! Retained state is purged when a key's evaluation concludes. The posted and
//! conflict-checked sets live until [`Generation::finish`] so a key is never
//! checked twice in one generation, however often it restarts.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::compat::Compatibility;
use super::types::{TestType, TopLevelKey};
use crate::event::{BuildEvent, EventSink};

#[derive(Debug, Default)]
pub struct Generation {
  number: AtomicU64,
  posted: DashSet<(TopLevelKey, &'static str)>,
  conflict_checked: DashSet<TopLevelKey>,
  test_types: DashMap<TopLevelKey, TestType>,
  compatibility: DashMap<TopLevelKey, Compatibility>,
}

impl Generation {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn number(&self) -> u64 {
    self.number.load(Ordering::SeqCst)
  }

  /// Post `event` unless an event of the same kind was already posted for
  /// its key. Returns whether it was posted.
  pub fn post_once(&self, sink: &dyn EventSink, event: BuildEvent) -> bool {
    if !self.posted.insert((event.key.clone(), event.kind.name())) {
      return false;
    }
    sink.post(event);
    true
  }

  /// `true` for the first caller per key in this generation.
  pub fn begin_conflict_check(&self, key: &TopLevelKey) -> bool {
    self.conflict_checked.insert(key.clone())
  }

  pub fn was_conflict_checked(&self, key: &TopLevelKey) -> bool {
    self.conflict_checked.contains(key)
  }

  /// The key's test type, computed on first use.
  pub fn test_type(&self, key: &TopLevelKey, classify: impl FnOnce() -> TestType) -> TestType {
    *self.test_types.entry(key.clone()).or_insert_with(classify).value()
  }

  pub fn compatibility(&self, key: &TopLevelKey) -> Option<Compatibility> {
    self.compatibility.get(key).map(|entry| entry.value().clone())
  }

  pub fn retain_compatibility(&self, key: &TopLevelKey, compatibility: Compatibility) {
    self.compatibility.insert(key.clone(), compatibility);
  }

  /// Drop retained state for a key whose evaluation concluded.
  pub fn purge(&self, key: &TopLevelKey) {
    self.test_types.remove(key);
    self.compatibility.remove(key);
  }

  /// Number of keys with retained state.
  pub fn retained(&self) -> usize {
    let mut keys: BTreeSet<TopLevelKey> = self.test_types.iter().map(|entry| entry.key().clone()).collect();
    keys.extend(self.compatibility.iter().map(|entry| entry.key().clone()));
    keys.len()
  }

  /// End the generation: clear every set and map and start the next one.
  pub fn finish(&self) -> u64 {
    self.posted.clear();
    self.conflict_checked.clear();
    self.test_types.clear();
    self.compatibility.clear();
    let next = self.number.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(generation = next, "evaluation generation finished");
    next
  }
}
