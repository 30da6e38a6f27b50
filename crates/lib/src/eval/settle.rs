//! Drive a restartable unit until it produces a value.

use std::fmt;

use tracing::{debug, trace};

use super::{Eval, Halt, Pending};

/// A value produced by [`settle_loop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
  pub value: T,
  /// How many times the unit was re-invoked after a suspension.
  pub restarts: usize,
}

/// Why [`settle_loop`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsettled<E> {
  /// A settle pass produced nothing, so the unit can never make progress.
  Stalled { restarts: usize, pending: Pending },
  /// The restart bound was reached.
  Exhausted { restarts: usize, pending: Pending },
  /// The evaluation was interrupted.
  Interrupted,
  /// The unit failed.
  Failed(E),
}

impl<E> Unsettled<E> {
  pub fn map_failed<F>(self, f: impl FnOnce(E) -> F) -> Unsettled<F> {
    match self {
      Unsettled::Stalled { restarts, pending } => Unsettled::Stalled { restarts, pending },
      Unsettled::Exhausted { restarts, pending } => Unsettled::Exhausted { restarts, pending },
      Unsettled::Interrupted => Unsettled::Interrupted,
      Unsettled::Failed(error) => Unsettled::Failed(f(error)),
    }
  }
}

impl<E: fmt::Display> fmt::Display for Unsettled<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Unsettled::Stalled { restarts, pending } => {
        write!(f, "no progress after {restarts} restart(s), still waiting for {pending}")
      }
      Unsettled::Exhausted { restarts, pending } => {
        write!(f, "gave up after {restarts} restart(s), still waiting for {pending}")
      }
      Unsettled::Interrupted => write!(f, "interrupted"),
      Unsettled::Failed(error) => write!(f, "{error}"),
    }
  }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Unsettled<E> {}

/// Re-invoke `unit` from its start until it stops suspending.
///
/// After every suspension `settle` produces the requested values and returns
/// how many it produced. A settle that produces nothing means the missing
/// values can never appear, and the loop stops with [`Unsettled::Stalled`].
pub fn settle_loop<T, E>(
  mut unit: impl FnMut() -> Eval<T, E>,
  mut settle: impl FnMut() -> usize,
  max_restarts: usize,
) -> Result<Settled<T>, Unsettled<E>> {
  let mut restarts = 0;
  loop {
    match unit() {
      Ok(value) => return Ok(Settled { value, restarts }),
      Err(Halt::Failed(error)) => return Err(Unsettled::Failed(error)),
      Err(Halt::Interrupted) => return Err(Unsettled::Interrupted),
      Err(Halt::Suspend(pending)) => {
        trace!(restarts, pending = %pending, "unit suspended");
        if restarts >= max_restarts {
          return Err(Unsettled::Exhausted { restarts, pending });
        }
        let produced = settle();
        if produced == 0 {
          debug!(restarts, pending = %pending, "settle produced no values");
          return Err(Unsettled::Stalled { restarts, pending });
        }
        restarts += 1;
      }
    }
  }
}
