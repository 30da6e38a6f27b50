//! Build option sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::hash::{Checksum, hash_bytes};

/// The value of a single build option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
  Bool(bool),
  Int(i64),
  Str(String),
  List(Vec<String>),
}

impl OptionValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      OptionValue::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      OptionValue::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

impl fmt::Display for OptionValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OptionValue::Bool(b) => write!(f, "{b}"),
      OptionValue::Int(n) => write!(f, "{n}"),
      OptionValue::Str(s) => write!(f, "{s}"),
      OptionValue::List(items) => write!(f, "[{}]", items.join(",")),
    }
  }
}

impl From<&str> for OptionValue {
  fn from(value: &str) -> Self {
    OptionValue::Str(value.to_string())
  }
}

impl From<String> for OptionValue {
  fn from(value: String) -> Self {
    OptionValue::Str(value)
  }
}

impl From<bool> for OptionValue {
  fn from(value: bool) -> Self {
    OptionValue::Bool(value)
  }
}

impl From<i64> for OptionValue {
  fn from(value: i64) -> Self {
    OptionValue::Int(value)
  }
}

/// A complete, ordered set of build options.
///
/// Two option sets are the same configuration input exactly when they are
/// equal as maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildOptions(BTreeMap<String, OptionValue>);

impl BuildOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&OptionValue> {
    self.0.get(name)
  }

  pub fn get_str(&self, name: &str) -> Option<&str> {
    self.0.get(name).and_then(OptionValue::as_str)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
    self.0.insert(name.into(), value.into());
  }

  /// Builder form of [`BuildOptions::set`].
  pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
    self.set(name, value);
    self
  }

  pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
    self.0.remove(name)
  }

  /// A copy of `self` with every option in `overrides` replaced.
  pub fn overlay(&self, overrides: &BuildOptions) -> BuildOptions {
    let mut merged = self.clone();
    for (name, value) in &overrides.0 {
      merged.0.insert(name.clone(), value.clone());
    }
    merged
  }

  /// Whether every option in `subset` is present here with the same value.
  pub fn contains_all(&self, subset: &BuildOptions) -> bool {
    subset.0.iter().all(|(name, value)| self.0.get(name) == Some(value))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Canonical text form: one `name=value` line per option, sorted by name.
  pub fn canonical(&self) -> String {
    let mut out = String::new();
    for (name, value) in &self.0 {
      out.push_str(&format!("{name:?}={value:?}\n"));
    }
    out
  }

  /// SHA-256 of [`BuildOptions::canonical`].
  pub fn checksum(&self) -> Checksum {
    hash_bytes(self.canonical().as_bytes())
  }
}

impl FromIterator<(String, OptionValue)> for BuildOptions {
  fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl<'a> IntoIterator for &'a BuildOptions {
  type Item = (&'a String, &'a OptionValue);
  type IntoIter = std::collections::btree_map::Iter<'a, String, OptionValue>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

impl fmt::Display for BuildOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
    write!(f, "{{{}}}", parts.join(", "))
  }
}
