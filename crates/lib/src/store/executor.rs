//! Execution that records what ran.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::lazy::LazyTable;
use crate::driver::{ExecutionFailure, ExecutionKey};
use crate::env::ExecutionRequester;
use crate::eval::Lookup;

type Executed = Result<(), ExecutionFailure>;

/// "Executes" a key by recording it. Each key runs at most once.
pub struct RecordingExecutor {
  table: LazyTable<ExecutionKey, Executed>,
  executed: Mutex<Vec<ExecutionKey>>,
  failures: BTreeMap<ExecutionKey, String>,
}

impl RecordingExecutor {
  pub fn new(deferred: bool) -> Self {
    Self {
      table: LazyTable::new(deferred),
      executed: Mutex::new(Vec::new()),
      failures: BTreeMap::new(),
    }
  }

  /// Make executing `key` fail with `message`.
  pub fn fail(&mut self, key: ExecutionKey, message: impl Into<String>) {
    self.failures.insert(key, message.into());
  }

  /// Keys in the order they ran.
  pub fn executed(&self) -> Vec<ExecutionKey> {
    self.executed.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|key| self.run(key))
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn run(&self, key: &ExecutionKey) -> Executed {
    debug!(key = %key, "executing");
    self
      .executed
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(key.clone());
    match self.failures.get(key) {
      Some(message) => Err(ExecutionFailure {
        key: key.clone(),
        message: message.clone(),
      }),
      None => Ok(()),
    }
  }
}

impl ExecutionRequester for RecordingExecutor {
  /// Requests every key before reporting, so one round covers the batch.
  fn request(&self, keys: &[ExecutionKey]) -> Lookup<Executed> {
    let mut pending = false;
    let mut failure = None;
    for key in keys {
      match self.table.get(key, |key| self.run(key)) {
        Lookup::Pending => pending = true,
        Lookup::Ready(Err(error)) => {
          failure.get_or_insert(error);
        }
        Lookup::Ready(Ok(())) => {}
      }
    }
    match (failure, pending) {
      (Some(error), _) => Lookup::Ready(Err(error)),
      (None, true) => Lookup::Pending,
      (None, false) => Lookup::Ready(Ok(())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::action::Artifact;

  fn artifact(path: &str) -> ExecutionKey {
    ExecutionKey::Artifact(Artifact(path.to_string()))
  }

  #[test]
  fn each_key_runs_once() {
    let executor = RecordingExecutor::new(false);
    let keys = vec![artifact("a"), artifact("b")];
    assert_eq!(executor.request(&keys), Lookup::Ready(Ok(())));
    assert_eq!(executor.request(&keys), Lookup::Ready(Ok(())));
    assert_eq!(executor.executed(), keys);
  }

  #[test]
  fn deferred_requests_run_on_settle() {
    let executor = RecordingExecutor::new(true);
    assert!(executor.request(&[artifact("a")]).is_pending());
    assert!(executor.executed().is_empty());
    assert_eq!(executor.settle(), 1);
    assert_eq!(executor.request(&[artifact("a")]), Lookup::Ready(Ok(())));
  }

  #[test]
  fn failure_is_reported_after_requesting_the_batch() {
    let mut executor = RecordingExecutor::new(false);
    executor.fail(artifact("a"), "exit 1");
    let Lookup::Ready(Err(error)) = executor.request(&[artifact("a"), artifact("b")]) else {
      panic!("expected failure");
    };
    assert_eq!(error.message, "exit 1");
    assert_eq!(executor.executed().len(), 2);
  }
}
