//! Aspects: side computations attached to dependency edges.
//!
//! An aspect augments a configured node with extra providers without
//! changing its identity. Which requested aspects apply to a node depends on
//! the providers the node advertises and on the order they were requested.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::label::Label;
use crate::node::ConfiguredTargetKey;
use crate::provider::{ProviderId, ProviderValue, Providers};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aspect {
  pub name: String,
  /// Providers a target must advertise for the aspect to apply.
  #[serde(default)]
  pub required_providers: Vec<ProviderId>,
  /// Aspects that must be requested before this one.
  #[serde(default)]
  pub requires: Vec<String>,
  /// Providers the aspect adds to every node it is applied to.
  #[serde(default)]
  pub provides: BTreeMap<ProviderId, ProviderValue>,
}

impl Aspect {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      required_providers: Vec::new(),
      requires: Vec::new(),
      provides: BTreeMap::new(),
    }
  }

  /// Whether a node advertising `advertised` satisfies this aspect.
  pub fn applies_to(&self, advertised: &[ProviderId]) -> bool {
    self.required_providers.iter().all(|required| advertised.contains(required))
  }
}

/// Identifies one aspect applied to one configured target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AspectKey {
  pub aspect: String,
  pub target: ConfiguredTargetKey,
}

impl fmt::Display for AspectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} on {}", self.aspect, self.target)
  }
}

/// The providers an aspect produced for one configured target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectValue {
  pub key: AspectKey,
  pub providers: Providers,
}

/// Errors raised while computing or merging aspects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AspectError {
  /// An aspect requires another that is missing or requested after it.
  #[error("aspect '{aspect}' requires '{required}', which must be requested before it")]
  InconsistentOrdering { aspect: String, required: String },

  /// Two sources contributed the same provider to one node.
  #[error("duplicate provider '{provider}' while merging aspects into {target}")]
  DuplicateProvider { target: Label, provider: ProviderId },

  /// The same aspect was requested twice on one edge.
  #[error("aspect '{aspect}' requested more than once")]
  DuplicateAspect { aspect: String },

  /// The aspect's own evaluation failed.
  #[error("aspect '{aspect}' failed on {target}: {message}")]
  Failed {
    aspect: String,
    target: Label,
    message: String,
  },
}

/// The subset of `requested` that applies to a node advertising `advertised`.
///
/// Order is preserved. Fails on repeated aspects and on aspects whose
/// prerequisites are not requested ahead of them.
pub fn applicable_aspects(requested: &[Aspect], advertised: &[ProviderId]) -> Result<Vec<Aspect>, AspectError> {
  let mut seen: HashSet<&str> = HashSet::new();
  for aspect in requested {
    for required in &aspect.requires {
      if !seen.contains(required.as_str()) {
        return Err(AspectError::InconsistentOrdering {
          aspect: aspect.name.clone(),
          required: required.clone(),
        });
      }
    }
    if !seen.insert(aspect.name.as_str()) {
      return Err(AspectError::DuplicateAspect {
        aspect: aspect.name.clone(),
      });
    }
  }

  Ok(
    requested
      .iter()
      .filter(|aspect| aspect.applies_to(advertised))
      .cloned()
      .collect(),
  )
}
