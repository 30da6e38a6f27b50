//! Inputs and outputs of the prerequisite resolver.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::aspect::AspectError;
use crate::config::Configuration;
use crate::consts::PATCH_TRANSITION_KEY;
use crate::dependency::{Dependency, DependencyKind};
use crate::label::Label;
use crate::node::ConfiguredNode;
use crate::target::RootCause;

/// The configuration(s) one prerequisite label is requested in.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeConfiguration {
  /// A visibility edge: configuration-less, must be a package group.
  Visibility,
  /// One configuration, or none.
  Unary(Option<Arc<Configuration>>),
  /// One configuration (or none) per split key.
  Split(BTreeMap<String, Option<Arc<Configuration>>>),
}

impl AttributeConfiguration {
  /// Group the resolved dependencies of a single label.
  ///
  /// A lone dependency without a split branch key (no key, or only the
  /// patch key) is unary. Anything else becomes a split keyed by transition
  /// key, even with a single branch; dropping the key of a branch that
  /// matches the parent configuration is left to the resolver's cleanup.
  pub fn from_dependencies(kind: &DependencyKind, dependencies: &[Dependency]) -> Self {
    if matches!(kind, DependencyKind::Visibility) {
      return AttributeConfiguration::Visibility;
    }
    if let [only] = dependencies {
      if only.transition_keys.iter().all(|key| key == PATCH_TRANSITION_KEY) {
        return AttributeConfiguration::Unary(only.configuration.clone());
      }
    }
    let mut split = BTreeMap::new();
    for dependency in dependencies {
      for key in &dependency.transition_keys {
        split.insert(key.clone(), dependency.configuration.clone());
      }
    }
    AttributeConfiguration::Split(split)
  }

  /// Number of configured nodes this produces before cleanup.
  pub fn slot_count(&self) -> usize {
    match self {
      AttributeConfiguration::Visibility | AttributeConfiguration::Unary(_) => 1,
      AttributeConfiguration::Split(split) => split.len(),
    }
  }
}

/// A visibility edge pointed at something other than a package group.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid visibility dependency '{label}' of {parent}: {reason}")]
pub struct VisibilityError {
  pub parent: Label,
  pub label: Label,
  pub reason: String,
}

/// A prerequisite could not be created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot create prerequisite '{label}' of {parent}: {message}")]
pub struct CreationError {
  pub parent: Label,
  pub label: Label,
  /// Short identifier of the configuration the prerequisite was requested in.
  pub configuration: Option<String>,
  pub message: String,
  pub root_causes: Vec<RootCause>,
}

/// Receives the single outcome of a prerequisite resolution.
///
/// Errors arrive on separate channels because callers recover from them
/// differently: visibility errors are usually user-correctable, aspect
/// merge conflicts usually are not.
pub trait PrerequisiteSink {
  fn accept_prerequisites(&mut self, label: &Label, nodes: Vec<ConfiguredNode>);
  fn accept_visibility_error(&mut self, error: VisibilityError);
  fn accept_creation_error(&mut self, error: CreationError);
  fn accept_aspect_error(&mut self, error: AspectError);
}

/// What a finished prerequisite resolution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PrerequisiteOutcome {
  Prerequisites(Vec<ConfiguredNode>),
  Visibility(VisibilityError),
  Creation(CreationError),
  Aspect(AspectError),
}

impl PrerequisiteSink for Option<PrerequisiteOutcome> {
  fn accept_prerequisites(&mut self, _label: &Label, nodes: Vec<ConfiguredNode>) {
    *self = Some(PrerequisiteOutcome::Prerequisites(nodes));
  }

  fn accept_visibility_error(&mut self, error: VisibilityError) {
    *self = Some(PrerequisiteOutcome::Visibility(error));
  }

  fn accept_creation_error(&mut self, error: CreationError) {
    *self = Some(PrerequisiteOutcome::Creation(error));
  }

  fn accept_aspect_error(&mut self, error: AspectError) {
    *self = Some(PrerequisiteOutcome::Aspect(error));
  }
}
