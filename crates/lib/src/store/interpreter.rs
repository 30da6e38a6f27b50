//! A declarative interpreter for user-defined transitions.
//!
//! The `source` of a [`UserTransition`] is JSON in one of three shapes:
//!
//! ```json
//! { "set": { "cpu": "arm" } }
//! { "branches": { "arm": { "cpu": "arm" }, "k8": { "cpu": "k8" } } }
//! { "error": "unsupported platform" }
//! ```
//!
//! `set` yields a single output under the patch key. A value written as
//! `{ "$input": "<setting>" }` copies one of the declared inputs.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tracing::trace;

use crate::config::{BuildOptions, OptionValue};
use crate::consts::PATCH_TRANSITION_KEY;
use crate::env::TransitionInterpreter;
use crate::transition::{TransitionError, TransitionOutputs, UserTransition};

const INPUT_REF: &str = "$input";

#[derive(Debug, Default)]
pub struct DeclarativeInterpreter {
  invocations: AtomicUsize,
  evaluated: Mutex<Vec<String>>,
}

impl DeclarativeInterpreter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of times user code ran.
  pub fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }

  /// Transition ids in evaluation order.
  pub fn evaluated(&self) -> Vec<String> {
    self.evaluated.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

impl TransitionInterpreter for DeclarativeInterpreter {
  fn evaluate(
    &self,
    transition: &UserTransition,
    _options: &BuildOptions,
    inputs: &BTreeMap<String, OptionValue>,
  ) -> Result<TransitionOutputs, TransitionError> {
    self.invocations.fetch_add(1, Ordering::SeqCst);
    self
      .evaluated
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(transition.id.clone());
    trace!(transition = %transition.id, "interpreting transition");

    let fail = |message: String| TransitionError::Failed {
      transition: transition.id.clone(),
      message,
    };

    let source = &transition.source;
    if let Some(message) = source.get("error").and_then(Value::as_str) {
      return Err(fail(message.to_string()));
    }

    let branches: Vec<(String, &Value)> = match (source.get("set"), source.get("branches")) {
      (Some(set), None) => vec![(PATCH_TRANSITION_KEY.to_string(), set)],
      (None, Some(Value::Object(branches))) => branches.iter().map(|(key, body)| (key.clone(), body)).collect(),
      _ => return Err(fail("source must hold exactly one of 'set' or 'branches'".to_string())),
    };

    let mut outputs = TransitionOutputs::new();
    for (key, body) in branches {
      let Value::Object(values) = body else {
        return Err(fail(format!("branch '{key}' must be an object")));
      };
      let mut overrides = BTreeMap::new();
      for (name, value) in values {
        overrides.insert(name.clone(), resolve_value(value, inputs).map_err(fail)?);
      }
      outputs.insert(key, overrides);
    }
    Ok(outputs)
  }
}

fn resolve_value(value: &Value, inputs: &BTreeMap<String, OptionValue>) -> Result<OptionValue, String> {
  if let Some(reference) = value.get(INPUT_REF) {
    let name = reference
      .as_str()
      .ok_or_else(|| format!("'{INPUT_REF}' must name a setting"))?;
    return inputs
      .get(name)
      .cloned()
      .ok_or_else(|| format!("'{name}' is not a declared input"));
  }
  serde_json::from_value(value.clone()).map_err(|e| format!("unsupported option value {value}: {e}"))
}
