//! Transition descriptors and the built-in transitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BuildOptions, OptionValue};
use crate::consts::{IS_EXEC_OPTION, PATCH_TRANSITION_KEY, PLATFORMS_OPTION};
use crate::label::Label;
use crate::util::hash::hash_bytes;

/// Errors raised while applying a transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
  /// The transition's own code reported an error.
  #[error("transition '{transition}' failed: {message}")]
  Failed { transition: String, message: String },

  /// A split transition produced no branches.
  #[error("split transition '{transition}' returned no outputs")]
  EmptySplit { transition: String },

  /// A user-defined transition set an option it did not declare.
  #[error("transition '{transition}' set undeclared output '{output}'")]
  UndeclaredOutput { transition: String, output: String },

  /// A user-defined transition left a declared output unset.
  #[error("transition '{transition}' did not set declared output '{output}' in branch '{branch}'")]
  MissingOutput {
    transition: String,
    branch: String,
    output: String,
  },

  /// An input build setting has no value and no usable default.
  #[error("transition '{transition}' cannot read build setting '{setting}': {message}")]
  BuildSetting {
    transition: String,
    setting: String,
    message: String,
  },
}

/// A 1:1 option rewrite.
pub trait PatchTransition: fmt::Debug + Send + Sync {
  /// A string that fully determines the transition's behavior.
  fn identity(&self) -> String;

  fn patch(&self, options: &BuildOptions) -> Result<BuildOptions, TransitionError>;
}

/// A 1:N option rewrite. Branch keys must be distinct.
pub trait SplitTransition: fmt::Debug + Send + Sync {
  fn identity(&self) -> String;

  fn split(&self, options: &BuildOptions) -> Result<BTreeMap<String, BuildOptions>, TransitionError>;
}

/// A transition attached to a dependency edge.
#[derive(Debug, Clone)]
pub enum Transition {
  /// The dependency has no configuration (source files, package groups).
  Null,
  /// The dependency is built in the current configuration.
  NoTransition,
  Patch(Arc<dyn PatchTransition>),
  Split(Arc<dyn SplitTransition>),
  UserDefined(Arc<UserTransition>),
}

impl Transition {
  pub fn set_options(options: BuildOptions) -> Self {
    Transition::Patch(Arc::new(SetOptions(options)))
  }

  pub fn split_options(branches: BTreeMap<String, BuildOptions>) -> Self {
    Transition::Split(Arc::new(SplitOptions(branches)))
  }

  pub fn exec(platform: Label) -> Self {
    Transition::Patch(Arc::new(ExecTransition { platform }))
  }

  pub fn user(transition: UserTransition) -> Self {
    Transition::UserDefined(Arc::new(transition))
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Transition::Null)
  }

  /// Stable identity used for equality and cache keys.
  pub fn identity(&self) -> String {
    match self {
      Transition::Null => "null".to_string(),
      Transition::NoTransition => "none".to_string(),
      Transition::Patch(patch) => format!("patch:{}", patch.identity()),
      Transition::Split(split) => format!("split:{}", split.identity()),
      Transition::UserDefined(user) => format!("user:{}", user.identity()),
    }
  }
}

impl PartialEq for Transition {
  fn eq(&self, other: &Self) -> bool {
    self.identity() == other.identity()
  }
}

impl Eq for Transition {}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.identity())
  }
}

/// Patch transition that sets fixed option values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions(pub BuildOptions);

impl PatchTransition for SetOptions {
  fn identity(&self) -> String {
    format!("set{}", self.0)
  }

  fn patch(&self, options: &BuildOptions) -> Result<BuildOptions, TransitionError> {
    Ok(options.overlay(&self.0))
  }
}

/// Split transition with one fixed set of overrides per branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions(pub BTreeMap<String, BuildOptions>);

impl SplitTransition for SplitOptions {
  fn identity(&self) -> String {
    let branches: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}{v}")).collect();
    format!("split[{}]", branches.join(";"))
  }

  fn split(&self, options: &BuildOptions) -> Result<BTreeMap<String, BuildOptions>, TransitionError> {
    Ok(
      self
        .0
        .iter()
        .map(|(key, overrides)| (key.clone(), options.overlay(overrides)))
        .collect(),
    )
  }
}

/// Patch transition into the execution configuration of `platform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTransition {
  pub platform: Label,
}

impl PatchTransition for ExecTransition {
  fn identity(&self) -> String {
    format!("exec({})", self.platform)
  }

  fn patch(&self, options: &BuildOptions) -> Result<BuildOptions, TransitionError> {
    let mut patched = options.clone();
    patched.set(IS_EXEC_OPTION, true);
    patched.set(PLATFORMS_OPTION, self.platform.to_string());
    Ok(patched)
  }
}

/// A transition written in the build language.
///
/// It reads `inputs` (build setting names) and may write only `outputs`.
/// The body is opaque here and evaluated by a
/// [`TransitionInterpreter`](crate::env::TransitionInterpreter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTransition {
  pub id: String,
  #[serde(default)]
  pub inputs: Vec<String>,
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default)]
  pub source: serde_json::Value,
}

impl UserTransition {
  /// The id plus a digest of the whole descriptor. Two descriptors sharing
  /// an id but differing in inputs, outputs or body never compare equal.
  pub fn identity(&self) -> String {
    let mut descriptor = String::new();
    for part in [&self.id, &self.inputs.join(","), &self.outputs.join(","), &self.source.to_string()] {
      descriptor.push_str(part);
      descriptor.push('\0');
    }
    format!("{}@{}", self.id, hash_bytes(descriptor.as_bytes()).0)
  }
}

/// Output of a user-defined transition: branch key to option overrides.
pub type TransitionOutputs = BTreeMap<String, BTreeMap<String, OptionValue>>;

/// Result of applying a transition to a source option set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
  /// The destination has no configuration.
  ConfigurationLess,
  /// Destination option sets keyed by transition key.
  Options(BTreeMap<String, BuildOptions>),
}

impl Applied {
  pub(crate) fn single(options: BuildOptions) -> Self {
    let mut map = BTreeMap::new();
    map.insert(PATCH_TRANSITION_KEY.to_string(), options);
    Applied::Options(map)
  }
}
