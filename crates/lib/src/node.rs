//! Configured nodes: a target analyzed in one configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{Action, Artifact};
use crate::aspect::{AspectError, AspectValue};
use crate::config::Configuration;
use crate::label::Label;
use crate::provider::Providers;
use crate::target::{RootCause, Target};
use crate::util::hash::Checksum;

/// Identifies a configured target.
///
/// `configuration` is `None` for targets without a configuration (source
/// files, package groups, visibility edges).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfiguredTargetKey {
  pub label: Label,
  pub configuration: Option<Checksum>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub execution_platform: Option<Label>,
}

impl ConfiguredTargetKey {
  pub fn new(label: Label, configuration: Option<&Configuration>) -> Self {
    Self {
      label,
      configuration: configuration.map(|c| c.checksum().clone()),
      execution_platform: None,
    }
  }
}

impl fmt::Display for ConfiguredTargetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.configuration {
      Some(checksum) => write!(f, "{} ({})", self.label, checksum.short()),
      None => write!(f, "{} (null)", self.label),
    }
  }
}

/// Analysis of a configured target failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("analysis of {label} failed: {message}")]
pub struct AnalysisFailure {
  pub label: Label,
  pub message: String,
  pub root_causes: Vec<RootCause>,
}

/// A configured target plus the aspects merged onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredNode {
  pub key: ConfiguredTargetKey,
  pub target: Arc<Target>,
  pub configuration: Option<Arc<Configuration>>,
  /// Split keys this node was reached under. Empty unless a split or
  /// patch transition produced it.
  pub transition_keys: Vec<String>,
  pub providers: Providers,
  /// Names of aspects merged so far, in merge order.
  pub aspects: Vec<String>,
  /// Actions this node registers, instantiated for its configuration.
  pub actions: Vec<Action>,
}

impl ConfiguredNode {
  pub fn new(key: ConfiguredTargetKey, target: Arc<Target>, configuration: Option<Arc<Configuration>>) -> Self {
    let providers = target
      .providers
      .iter()
      .map(|(id, value)| (id.clone(), value.clone()))
      .collect();
    let actions = target
      .actions
      .iter()
      .enumerate()
      .map(|(index, template)| Action::from_template(&key, configuration.as_deref(), index, template))
      .collect();
    Self {
      key,
      target,
      configuration,
      transition_keys: Vec::new(),
      providers,
      aspects: Vec::new(),
      actions,
    }
  }

  pub fn label(&self) -> &Label {
    &self.key.label
  }

  /// Every output of every action, in registration order.
  pub fn artifacts(&self) -> Vec<Artifact> {
    self.actions.iter().flat_map(|action| action.outputs.iter().cloned()).collect()
  }

  /// Merge an aspect's providers into this node.
  ///
  /// Fails as a unit: on a duplicate provider the node keeps its previous
  /// providers.
  pub fn merge_aspect(&mut self, value: &AspectValue) -> Result<(), AspectError> {
    if self.aspects.contains(&value.key.aspect) {
      return Err(AspectError::DuplicateAspect {
        aspect: value.key.aspect.clone(),
      });
    }
    self
      .providers
      .merge(&value.providers)
      .map_err(|provider| AspectError::DuplicateProvider {
        target: self.key.label.clone(),
        provider,
      })?;
    self.aspects.push(value.key.aspect.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aspect::AspectKey;
  use crate::provider::{ProviderId, ProviderValue};
  use crate::util::testutil::label;

  fn node() -> ConfiguredNode {
    let mut target = Target::rule(label("//a:lib"), "cc_library");
    target
      .providers
      .insert(ProviderId::new("CcInfo"), ProviderValue::Strings(vec!["lib.a".to_string()]));
    let target = Arc::new(target);
    ConfiguredNode::new(ConfiguredTargetKey::new(target.label.clone(), None), target, None)
  }

  fn aspect_value(node: &ConfiguredNode, name: &str, provider: &str) -> AspectValue {
    AspectValue {
      key: AspectKey {
        aspect: name.to_string(),
        target: node.key.clone(),
      },
      providers: [(ProviderId::new(provider), ProviderValue::Flag(true))].into_iter().collect(),
    }
  }

  #[test]
  fn merges_aspect_providers() {
    let mut node = node();
    let value = aspect_value(&node, "lint", "LintInfo");
    node.merge_aspect(&value).unwrap();
    assert!(node.providers.contains(&ProviderId::new("LintInfo")));
    assert_eq!(node.aspects, vec!["lint".to_string()]);
  }

  #[test]
  fn duplicate_provider_fails_without_partial_merge() {
    let mut node = node();
    let value = aspect_value(&node, "shadow", "CcInfo");
    let err = node.merge_aspect(&value).unwrap_err();
    assert_eq!(
      err,
      AspectError::DuplicateProvider {
        target: label("//a:lib"),
        provider: ProviderId::new("CcInfo"),
      }
    );
    assert!(node.aspects.is_empty());
  }

  #[test]
  fn actions_follow_target_templates() {
    let mut target = Target::rule(label("//a:bin"), "cc_binary");
    target.actions.push(crate::target::ActionTemplate {
      mnemonic: "CppLink".to_string(),
      outputs: vec!["bin".to_string(), "bin.map".to_string()],
    });
    let target = Arc::new(target);
    let node = ConfiguredNode::new(ConfiguredTargetKey::new(target.label.clone(), None), target, None);
    assert_eq!(node.actions.len(), 1);
    assert_eq!(
      node.artifacts(),
      vec![Artifact("src/a/bin".to_string()), Artifact("src/a/bin.map".to_string())]
    );
  }

  #[test]
  fn key_display_marks_null_configuration() {
    let key = ConfiguredTargetKey::new(label("//a:src"), None);
    assert_eq!(key.to_string(), "//a:src (null)");
  }
}
