//! Restartable evaluation primitives.
//!
//! Every unit of work in this crate may discover that it needs a value the
//! evaluator has not produced yet. Instead of blocking, it returns
//! [`Halt::Suspend`] carrying every missing key it found in that attempt; the
//! evaluator produces those values and re-invokes the unit from its start.
//!
//! - [`Lookup`]: what a collaborator returns for one key
//! - [`Pending`]: the keys one attempt is waiting on
//! - [`Halt`]: why an attempt stopped without a value
//! - [`Interrupt`]: evaluation-wide cancellation flag
//! - [`MemoTable`]: at-most-once memoization with request tracking
//! - [`settle_loop`]: re-invokes a unit until it stops suspending

pub mod memo;
pub mod settle;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use memo::MemoTable;
pub use settle::{Settled, Unsettled, settle_loop};

/// Result of asking a collaborator for a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
  /// The value is available.
  Ready(T),
  /// The value has been requested and is not available yet.
  Pending,
}

impl<T> Lookup<T> {
  pub fn is_pending(&self) -> bool {
    matches!(self, Lookup::Pending)
  }

  pub fn ready(self) -> Option<T> {
    match self {
      Lookup::Ready(value) => Some(value),
      Lookup::Pending => None,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
    match self {
      Lookup::Ready(value) => Lookup::Ready(f(value)),
      Lookup::Pending => Lookup::Pending,
    }
  }
}

/// Keys requested during one attempt that were not available yet.
///
/// Units keep going after the first missing value so that a single
/// suspension reports everything they need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending {
  keys: Vec<String>,
}

impl Pending {
  pub fn new() -> Self {
    Self::default()
  }

  /// A pending set holding exactly one key.
  pub fn of(key: impl Into<String>) -> Self {
    let mut pending = Self::new();
    pending.request(key);
    pending
  }

  pub fn request(&mut self, key: impl Into<String>) {
    let key = key.into();
    if !self.keys.contains(&key) {
      self.keys.push(key);
    }
  }

  pub fn merge(&mut self, other: Pending) {
    for key in other.keys {
      self.request(key);
    }
  }

  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  /// `Ok(())` when nothing is missing, otherwise a suspension.
  pub fn into_result<E>(self) -> Result<(), Halt<E>> {
    if self.is_empty() { Ok(()) } else { Err(Halt::Suspend(self)) }
  }
}

impl fmt::Display for Pending {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} value(s): {}", self.keys.len(), self.keys.join(", "))
  }
}

/// Why an attempt stopped without producing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt<E> {
  /// Values are missing; re-invoke once they exist.
  Suspend(Pending),
  /// The evaluation was interrupted.
  Interrupted,
  /// A typed, non-retryable failure for this attempt.
  Failed(E),
}

impl<E> Halt<E> {
  /// Convert the failure payload, keeping suspensions and interrupts.
  pub fn map_failed<F>(self, f: impl FnOnce(E) -> F) -> Halt<F> {
    match self {
      Halt::Suspend(pending) => Halt::Suspend(pending),
      Halt::Interrupted => Halt::Interrupted,
      Halt::Failed(error) => Halt::Failed(f(error)),
    }
  }

  pub fn is_suspend(&self) -> bool {
    matches!(self, Halt::Suspend(_))
  }
}

impl<E> From<E> for Halt<E> {
  fn from(error: E) -> Self {
    Halt::Failed(error)
  }
}

impl<E: fmt::Display> fmt::Display for Halt<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Halt::Suspend(pending) => write!(f, "suspended waiting for {pending}"),
      Halt::Interrupted => write!(f, "interrupted"),
      Halt::Failed(error) => write!(f, "{error}"),
    }
  }
}

/// Outcome of one attempt of a restartable unit.
pub type Eval<T, E> = Result<T, Halt<E>>;

/// Evaluation-wide interruption flag.
///
/// Cloning shares the flag. Long-running loops call [`Interrupt::check`]
/// between sub-steps that allocate or run user transition code.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }

  pub fn is_triggered(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn check<E>(&self) -> Result<(), Halt<E>> {
    if self.is_triggered() { Err(Halt::Interrupted) } else { Ok(()) }
  }
}
