//! Dependency edges before and after configuration resolution.

use std::fmt;
use std::sync::Arc;

use crate::aspect::Aspect;
use crate::config::Configuration;
use crate::label::Label;
use crate::node::ConfiguredTargetKey;
use crate::transition::Transition;

/// How a dependency edge was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
  /// A rule attribute. `split` is the attribute's own split transition,
  /// whose keys are recorded even on configuration-less edges.
  Attribute { name: String, split: Option<Transition> },
  /// A toolchain resolved for an execution platform.
  Toolchain,
  /// A visibility declaration. Always configuration-less.
  Visibility,
  /// A rule's own incoming transition.
  Incoming,
}

impl DependencyKind {
  pub fn attribute(name: impl Into<String>) -> Self {
    DependencyKind::Attribute {
      name: name.into(),
      split: None,
    }
  }
}

impl fmt::Display for DependencyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DependencyKind::Attribute { name, .. } => write!(f, "attribute '{name}'"),
      DependencyKind::Toolchain => write!(f, "toolchain"),
      DependencyKind::Visibility => write!(f, "visibility"),
      DependencyKind::Incoming => write!(f, "incoming transition"),
    }
  }
}

/// One declared edge, the input to resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKey {
  pub label: Label,
  pub transition: Transition,
  pub execution_platform: Option<Label>,
  pub aspects: Vec<Aspect>,
}

impl DependencyKey {
  pub fn new(label: Label) -> Self {
    Self {
      label,
      transition: Transition::NoTransition,
      execution_platform: None,
      aspects: Vec::new(),
    }
  }

  pub fn with_transition(mut self, transition: Transition) -> Self {
    self.transition = transition;
    self
  }

  pub fn with_execution_platform(mut self, platform: Label) -> Self {
    self.execution_platform = Some(platform);
    self
  }

  pub fn with_aspects(mut self, aspects: Vec<Aspect>) -> Self {
    self.aspects = aspects;
    self
  }
}

/// A resolved edge: the dependency and the configuration to build it in.
///
/// Equality is structural, configurations included.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
  pub label: Label,
  pub configuration: Option<Arc<Configuration>>,
  /// Empty for configuration-less and no-op edges.
  pub transition_keys: Vec<String>,
  pub execution_platform: Option<Label>,
  pub aspects: Vec<Aspect>,
}

impl Dependency {
  pub fn configuration_less(key: &DependencyKey, transition_keys: Vec<String>) -> Self {
    Self {
      label: key.label.clone(),
      configuration: None,
      transition_keys,
      execution_platform: key.execution_platform.clone(),
      aspects: key.aspects.clone(),
    }
  }

  pub fn configured(key: &DependencyKey, configuration: Arc<Configuration>, transition_keys: Vec<String>) -> Self {
    Self {
      label: key.label.clone(),
      configuration: Some(configuration),
      transition_keys,
      execution_platform: key.execution_platform.clone(),
      aspects: key.aspects.clone(),
    }
  }

  /// The single transition key, when there is exactly one.
  pub fn transition_key(&self) -> Option<&str> {
    match self.transition_keys.as_slice() {
      [key] => Some(key),
      _ => None,
    }
  }

  pub fn configured_target_key(&self) -> ConfiguredTargetKey {
    let mut key = ConfiguredTargetKey::new(self.label.clone(), self.configuration.as_deref());
    key.execution_platform = self.execution_platform.clone();
    key
  }
}

impl fmt::Display for Dependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.configuration {
      Some(configuration) => write!(f, "{} [{}]", self.label, configuration.mnemonic())?,
      None => write!(f, "{} [null]", self.label)?,
    }
    if !self.transition_keys.is_empty() {
      write!(f, " keys={}", self.transition_keys.join(","))?;
    }
    Ok(())
  }
}
