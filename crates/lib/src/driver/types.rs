//! Keys, values and errors of the build driver.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::action::{Action, Artifact, ConflictError};
use crate::aspect::AspectKey;
use crate::label::Label;
use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};

/// A requested top-level target or aspect.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopLevelKey {
  Target(ConfiguredTargetKey),
  Aspect(AspectKey),
}

impl TopLevelKey {
  /// The configured target the key is about.
  pub fn target(&self) -> &ConfiguredTargetKey {
    match self {
      TopLevelKey::Target(key) => key,
      TopLevelKey::Aspect(key) => &key.target,
    }
  }

  pub fn label(&self) -> &Label {
    &self.target().label
  }

  pub fn is_aspect(&self) -> bool {
    matches!(self, TopLevelKey::Aspect(_))
  }
}

impl fmt::Display for TopLevelKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TopLevelKey::Target(key) => write!(f, "{key}"),
      TopLevelKey::Aspect(key) => write!(f, "{key}"),
    }
  }
}

/// Input of one driver evaluation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BuildDriverKey {
  pub top_level: TopLevelKey,
  /// Named on the command line rather than reached through a pattern.
  pub explicitly_requested: bool,
}

impl BuildDriverKey {
  pub fn new(top_level: TopLevelKey, explicitly_requested: bool) -> Self {
    Self {
      top_level,
      explicitly_requested,
    }
  }
}

impl fmt::Display for BuildDriverKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.top_level)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
  NotTest,
  /// Runs alongside other tests.
  Parallel,
  /// Runs alone, after every other execution.
  Exclusive,
  /// Runs alone when executed locally, otherwise in parallel.
  ExclusiveIfLocal,
}

impl TestType {
  pub fn is_test(self) -> bool {
    !matches!(self, TestType::NotTest)
  }
}

impl fmt::Display for TestType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TestType::NotTest => "not-test",
      TestType::Parallel => "parallel",
      TestType::Exclusive => "exclusive",
      TestType::ExclusiveIfLocal => "exclusive-if-local",
    };
    write!(f, "{name}")
  }
}

/// What analysis produced for one top-level key.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedValue {
  pub key: TopLevelKey,
  pub node: ConfiguredNode,
  /// Files to build when the key is requested.
  pub artifacts: Vec<Artifact>,
  /// Actions of the node and of everything it transitively depends on.
  pub actions: Vec<Action>,
  /// Why the target cannot be built for the target platform.
  pub incompatible: Option<String>,
  /// Environments the target is restricted to. Empty means unrestricted.
  pub restricted_to: Vec<Label>,
}

impl AnalyzedValue {
  pub fn new(key: TopLevelKey, node: ConfiguredNode, actions: Vec<Action>) -> Self {
    Self {
      key,
      artifacts: node.artifacts(),
      incompatible: node.target.incompatible.clone(),
      restricted_to: node.target.restricted_to.clone(),
      node,
      actions,
    }
  }
}

/// A unit of work handed to the execution subsystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKey {
  Artifact(Artifact),
  TestCompletion { target: ConfiguredTargetKey, exclusive: bool },
}

impl fmt::Display for ExecutionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionKey::Artifact(artifact) => write!(f, "artifact {artifact}"),
      ExecutionKey::TestCompletion { target, exclusive: true } => write!(f, "exclusive test {target}"),
      ExecutionKey::TestCompletion { target, exclusive: false } => write!(f, "test {target}"),
    }
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("execution of {key} failed: {message}")]
pub struct ExecutionFailure {
  pub key: ExecutionKey,
  pub message: String,
}

/// Terminal result of one driver evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildDriverValue {
  pub key: BuildDriverKey,
  pub test_type: TestType,
  /// Set when the target was skipped, with the reason.
  pub skipped: Option<String>,
  /// An exclusive test left for sequential execution after the build.
  pub exclusive_test: Option<ExecutionKey>,
}

impl BuildDriverValue {
  pub fn is_skipped(&self) -> bool {
    self.skipped.is_some()
  }
}

/// A top-level target cannot be built where it was requested.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetCompatibilityViolation {
  /// An explicitly requested target is incompatible with the target platform.
  #[error("{label} is incompatible with the target platform: {reason}")]
  IncompatiblePlatform { label: Label, reason: String },

  /// An explicitly requested target does not support required environments.
  #[error("{label} does not support required environment(s): {}", .environments.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
  MissingEnvironments { label: Label, environments: Vec<Label> },
}

/// Errors that end one driver evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
  /// Actions in the key's closure claim the same outputs. Transient: a
  /// later build with different inputs may not conflict.
  #[error("{key}: {} conflicting action(s)", .conflicts.len())]
  ActionConflict {
    key: TopLevelKey,
    conflicts: Vec<ConflictError>,
  },

  #[error(transparent)]
  Compatibility(#[from] TargetCompatibilityViolation),

  #[error(transparent)]
  Analysis(#[from] AnalysisFailure),

  #[error(transparent)]
  Execution(#[from] ExecutionFailure),

  #[error("evaluation interrupted")]
  Interrupted,
}

impl DriverError {
  /// Whether a later evaluation generation may succeed unchanged.
  pub fn is_transient(&self) -> bool {
    matches!(self, DriverError::ActionConflict { .. })
  }
}
