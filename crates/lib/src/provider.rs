//! Provider values carried by configured nodes.
//!
//! A configured node exposes its results as a capability-keyed map from
//! [`ProviderId`] to a closed set of [`ProviderValue`] shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Names one kind of provider, e.g. `DefaultInfo`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }
}

impl fmt::Display for ProviderId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProviderValue {
  Files(Vec<String>),
  Strings(Vec<String>),
  Flag(bool),
  /// Output group name to files. Merges group by group.
  OutputGroups(BTreeMap<String, Vec<String>>),
  Struct(BTreeMap<String, String>),
}

/// The provider map of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Providers(BTreeMap<ProviderId, ProviderValue>);

impl Providers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &ProviderId) -> Option<&ProviderValue> {
    self.0.get(id)
  }

  pub fn contains(&self, id: &ProviderId) -> bool {
    self.0.contains_key(id)
  }

  pub fn insert(&mut self, id: ProviderId, value: ProviderValue) {
    self.0.insert(id, value);
  }

  pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
    self.0.keys()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Merge `other` into `self`.
  ///
  /// Returns the first provider both sides define. Output groups merge per
  /// group; a group present on both sides is a duplicate too. On error
  /// `self` is left unchanged.
  pub fn merge(&mut self, other: &Providers) -> Result<(), ProviderId> {
    let mut merged = self.0.clone();
    for (id, value) in &other.0 {
      match (merged.get_mut(id), value) {
        (None, _) => {
          merged.insert(id.clone(), value.clone());
        }
        (Some(ProviderValue::OutputGroups(mine)), ProviderValue::OutputGroups(theirs)) => {
          for (group, files) in theirs {
            if mine.contains_key(group) {
              return Err(ProviderId::new(format!("{id}.{group}")));
            }
            mine.insert(group.clone(), files.clone());
          }
        }
        (Some(_), _) => return Err(id.clone()),
      }
    }
    self.0 = merged;
    Ok(())
  }
}

impl FromIterator<(ProviderId, ProviderValue)> for Providers {
  fn from_iter<I: IntoIterator<Item = (ProviderId, ProviderValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}
