//! Target definitions and package load errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aspect::Aspect;
use crate::config::OptionValue;
use crate::consts::{EXCLUSIVE_IF_LOCAL_TAG, EXCLUSIVE_TAG, TEST_RULE_SUFFIX};
use crate::label::{Label, PackageId};
use crate::provider::{ProviderId, ProviderValue};
use crate::transition::Transition;

/// Errors reported by the package store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PackageLoadError {
  /// The package does not exist.
  #[error("no such package '{package}': {message}")]
  NoSuchPackage { package: PackageId, message: String },

  /// The package exists but its definition is malformed.
  #[error("error loading package '{package}': {message}")]
  BuildFile { package: PackageId, message: String },

  /// The package loaded but has no target with this name.
  #[error("no such target '{label}'")]
  NoSuchTarget { label: Label },

  /// The external repository holding the package could not be fetched.
  #[error("cannot fetch repository '@{repo}': {message}")]
  RepositoryFetch { repo: String, message: String },
}

impl PackageLoadError {
  /// Whether the error is about `label` itself or its owning package.
  pub fn pertains_to(&self, label: &Label) -> bool {
    match self {
      PackageLoadError::NoSuchPackage { package, .. } | PackageLoadError::BuildFile { package, .. } => {
        *package == label.package_id()
      }
      PackageLoadError::NoSuchTarget { label: missing } => missing == label,
      PackageLoadError::RepositoryFetch { repo, .. } => repo == label.repo(),
    }
  }

  /// The label or package the error is about.
  pub fn subject(&self) -> String {
    match self {
      PackageLoadError::NoSuchPackage { package, .. } | PackageLoadError::BuildFile { package, .. } => {
        package.to_string()
      }
      PackageLoadError::NoSuchTarget { label } => label.to_string(),
      PackageLoadError::RepositoryFetch { repo, .. } => format!("@{repo}"),
    }
  }

  pub fn is_repository_fetch(&self) -> bool {
    matches!(self, PackageLoadError::RepositoryFetch { .. })
  }
}

/// What kind of target a label names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
  /// An instance of a rule class such as `cc_library` or `sh_test`.
  Rule { rule_class: String },
  /// A named set of packages, the only valid target of a visibility edge.
  PackageGroup,
  SourceFile,
  /// A constraint environment a target can be restricted to.
  Environment {
    #[serde(default)]
    fulfills: Vec<Label>,
  },
  /// A user-defined build setting and its default value.
  BuildSetting { default: OptionValue },
}

/// One action a rule registers, as declared in its package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTemplate {
  pub mnemonic: String,
  #[serde(default)]
  pub outputs: Vec<String>,
}

/// A loaded target definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
  pub label: Label,
  pub kind: TargetKind,
  /// Attribute name to the labels it references, in declaration order.
  pub attributes: BTreeMap<String, Vec<Label>>,
  pub tags: Vec<String>,
  /// Providers the rule advertises and returns.
  pub providers: BTreeMap<ProviderId, ProviderValue>,
  pub actions: Vec<ActionTemplate>,
  pub restricted_to: Vec<Label>,
  /// Platform the target cannot be built for, with the reason.
  pub incompatible: Option<String>,
  /// Transition applied to every incoming edge.
  pub incoming_transition: Option<Transition>,
  /// Per-attribute outgoing transitions.
  pub attribute_transitions: BTreeMap<String, Transition>,
  /// Per-attribute aspects propagated onto dependencies.
  pub attribute_aspects: BTreeMap<String, Vec<Aspect>>,
}

impl Target {
  pub fn new(label: Label, kind: TargetKind) -> Self {
    Self {
      label,
      kind,
      attributes: BTreeMap::new(),
      tags: Vec::new(),
      providers: BTreeMap::new(),
      actions: Vec::new(),
      restricted_to: Vec::new(),
      incompatible: None,
      incoming_transition: None,
      attribute_transitions: BTreeMap::new(),
      attribute_aspects: BTreeMap::new(),
    }
  }

  pub fn rule(label: Label, rule_class: impl Into<String>) -> Self {
    Self::new(
      label,
      TargetKind::Rule {
        rule_class: rule_class.into(),
      },
    )
  }

  pub fn rule_class(&self) -> Option<&str> {
    match &self.kind {
      TargetKind::Rule { rule_class } => Some(rule_class),
      _ => None,
    }
  }

  pub fn is_test(&self) -> bool {
    self.rule_class().is_some_and(|class| class.ends_with(TEST_RULE_SUFFIX))
  }

  pub fn is_package_group(&self) -> bool {
    matches!(self.kind, TargetKind::PackageGroup)
  }

  /// Whether the target has a configuration at all.
  pub fn is_configurable(&self) -> bool {
    matches!(self.kind, TargetKind::Rule { .. })
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.iter().any(|t| t == tag)
  }

  pub fn is_exclusive(&self) -> bool {
    self.has_tag(EXCLUSIVE_TAG)
  }

  pub fn is_exclusive_if_local(&self) -> bool {
    self.has_tag(EXCLUSIVE_IF_LOCAL_TAG)
  }

  pub fn advertised_providers(&self) -> Vec<ProviderId> {
    self.providers.keys().cloned().collect()
  }
}

/// A loaded package: its targets by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
  pub id: PackageId,
  pub targets: BTreeMap<String, Arc<Target>>,
}

impl Package {
  pub fn new(id: PackageId) -> Self {
    Self {
      id,
      targets: BTreeMap::new(),
    }
  }

  pub fn add(&mut self, target: Target) {
    self.targets.insert(target.label.name().to_string(), Arc::new(target));
  }

  pub fn target(&self, name: &str) -> Result<Arc<Target>, PackageLoadError> {
    self
      .targets
      .get(name)
      .cloned()
      .ok_or_else(|| PackageLoadError::NoSuchTarget {
        label: self.id.label(name),
      })
  }
}
