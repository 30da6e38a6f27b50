//! Build events posted by the driver.
//!
//! Posting is fire-and-forget: a sink never blocks the driver and can never
//! fail the computation that posted.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::driver::{TestType, TopLevelKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
  TargetAnalyzed,
  TestAnalyzed { skipped: bool },
  TargetSkipped { reason: String },
  ActionConflict { conflicts: Vec<String> },
  TargetCompleted { test_type: TestType },
}

impl EventKind {
  /// Name used to post each kind at most once per key.
  pub fn name(&self) -> &'static str {
    match self {
      EventKind::TargetAnalyzed => "target_analyzed",
      EventKind::TestAnalyzed { .. } => "test_analyzed",
      EventKind::TargetSkipped { .. } => "target_skipped",
      EventKind::ActionConflict { .. } => "action_conflict",
      EventKind::TargetCompleted { .. } => "target_completed",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEvent {
  pub key: TopLevelKey,
  #[serde(flatten)]
  pub kind: EventKind,
}

pub trait EventSink: Send + Sync {
  fn post(&self, event: BuildEvent);
}

/// Keeps every posted event in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
  events: Mutex<Vec<BuildEvent>>,
}

impl RecordingSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<BuildEvent> {
    self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
  }

  /// Events posted for one key.
  pub fn events_for(&self, key: &TopLevelKey) -> Vec<EventKind> {
    self
      .events()
      .into_iter()
      .filter(|event| &event.key == key)
      .map(|event| event.kind)
      .collect()
  }

  pub fn clear(&self) {
    self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
  }
}

impl EventSink for RecordingSink {
  fn post(&self, event: BuildEvent) {
    self
      .events
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .push(event);
  }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
  fn post(&self, event: BuildEvent) {
    info!(key = %event.key, event = event.kind.name(), "build event");
  }
}
