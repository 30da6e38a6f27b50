//! Target labels and package identifiers.
//!
//! A label names one target: `@repo//package/path:name`. Labels in the main
//! repository omit the `@repo` prefix. Inside a package, `:name` refers to a
//! sibling target and is resolved with [`Label::parse_relative`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a label.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
  /// The label text was empty.
  #[error("empty label")]
  Empty,

  /// A repository-qualified label without `//`.
  #[error("invalid label '{0}': expected '@repo//package:name'")]
  MissingPackage(String),

  /// A relative label used where an absolute one is required.
  #[error("invalid label '{0}': relative labels need a base package")]
  Relative(String),

  /// The target name was empty or contained a forbidden character.
  #[error("invalid target name in label '{0}'")]
  InvalidName(String),
}

/// The repository and path that identify a package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
  pub repo: String,
  pub path: String,
}

impl PackageId {
  pub fn new(repo: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      repo: repo.into(),
      path: path.into(),
    }
  }

  /// A package in the main repository.
  pub fn main(path: impl Into<String>) -> Self {
    Self::new("", path)
  }

  pub fn is_main_repo(&self) -> bool {
    self.repo.is_empty()
  }

  /// Parse `//path` or `@repo//path`.
  pub fn parse(text: &str) -> Result<Self, LabelError> {
    let (repo, rest) = split_repo(text)?;
    let path = rest.strip_prefix("//").ok_or_else(|| LabelError::MissingPackage(text.to_string()))?;
    Ok(Self::new(repo, path))
  }

  /// The label of a target inside this package.
  pub fn label(&self, name: impl Into<String>) -> Label {
    Label {
      repo: self.repo.clone(),
      package: self.path.clone(),
      name: name.into(),
    }
  }
}

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.repo.is_empty() {
      write!(f, "//{}", self.path)
    } else {
      write!(f, "@{}//{}", self.repo, self.path)
    }
  }
}

impl TryFrom<String> for PackageId {
  type Error = LabelError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<PackageId> for String {
  fn from(value: PackageId) -> Self {
    value.to_string()
  }
}

/// A fully qualified target label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label {
  repo: String,
  package: String,
  name: String,
}

impl Label {
  /// Parse an absolute label.
  ///
  /// `//pkg` is shorthand for `//pkg:pkg` (the last path component).
  pub fn parse(text: &str) -> Result<Self, LabelError> {
    if text.is_empty() {
      return Err(LabelError::Empty);
    }
    if !text.starts_with("//") && !text.starts_with('@') {
      return Err(LabelError::Relative(text.to_string()));
    }
    let (repo, rest) = split_repo(text)?;
    let rest = rest.strip_prefix("//").ok_or_else(|| LabelError::MissingPackage(text.to_string()))?;

    let (package, name) = match rest.split_once(':') {
      Some((package, name)) => (package, name),
      None => (rest, rest.rsplit('/').next().unwrap_or(rest)),
    };
    validate_name(text, name)?;

    Ok(Self {
      repo: repo.to_string(),
      package: package.to_string(),
      name: name.to_string(),
    })
  }

  /// Parse a label that may be relative to `base`.
  ///
  /// `:name` and bare `name` resolve inside `base`; absolute forms are parsed
  /// as with [`Label::parse`].
  pub fn parse_relative(text: &str, base: &PackageId) -> Result<Self, LabelError> {
    if text.is_empty() {
      return Err(LabelError::Empty);
    }
    if text.starts_with("//") || text.starts_with('@') {
      return Self::parse(text);
    }
    let name = text.strip_prefix(':').unwrap_or(text);
    validate_name(text, name)?;
    Ok(base.label(name))
  }

  pub fn repo(&self) -> &str {
    &self.repo
  }

  pub fn package(&self) -> &str {
    &self.package
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn package_id(&self) -> PackageId {
    PackageId::new(self.repo.clone(), self.package.clone())
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.repo.is_empty() {
      write!(f, "//{}:{}", self.package, self.name)
    } else {
      write!(f, "@{}//{}:{}", self.repo, self.package, self.name)
    }
  }
}

impl TryFrom<String> for Label {
  type Error = LabelError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<Label> for String {
  fn from(value: Label) -> Self {
    value.to_string()
  }
}

fn split_repo(text: &str) -> Result<(&str, &str), LabelError> {
  match text.strip_prefix('@') {
    Some(rest) => {
      let idx = rest.find("//").ok_or_else(|| LabelError::MissingPackage(text.to_string()))?;
      Ok((&rest[..idx], &rest[idx..]))
    }
    None => Ok(("", text)),
  }
}

fn validate_name(text: &str, name: &str) -> Result<(), LabelError> {
  if name.is_empty() || name.contains(':') || name.starts_with('/') {
    return Err(LabelError::InvalidName(text.to_string()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  mod parse {
    use super::*;

    #[test]
    fn main_repo_label() {
      let label = Label::parse("//app/server:bin").unwrap();
      assert_eq!(label.repo(), "");
      assert_eq!(label.package(), "app/server");
      assert_eq!(label.name(), "bin");
      assert_eq!(label.to_string(), "//app/server:bin");
    }

    #[test]
    fn external_repo_label() {
      let label = Label::parse("@zlib//:zlib").unwrap();
      assert_eq!(label.repo(), "zlib");
      assert_eq!(label.package(), "");
      assert_eq!(label.to_string(), "@zlib//:zlib");
      assert!(!label.package_id().is_main_repo());
    }

    #[test]
    fn package_shorthand_uses_last_component() {
      let label = Label::parse("//tools/lint").unwrap();
      assert_eq!(label.name(), "lint");
    }

    #[test]
    fn rejects_relative_and_malformed() {
      assert_eq!(Label::parse(""), Err(LabelError::Empty));
      assert!(matches!(Label::parse(":a"), Err(LabelError::Relative(_))));
      assert!(matches!(Label::parse("@repo:a"), Err(LabelError::MissingPackage(_))));
      assert!(matches!(Label::parse("//pkg:"), Err(LabelError::InvalidName(_))));
    }
  }

  mod relative {
    use super::*;

    #[test]
    fn colon_and_bare_names_resolve_in_base() {
      let base = PackageId::main("pkg");
      assert_eq!(Label::parse_relative(":a", &base).unwrap().to_string(), "//pkg:a");
      assert_eq!(Label::parse_relative("b", &base).unwrap().to_string(), "//pkg:b");
    }

    #[test]
    fn absolute_labels_ignore_base() {
      let base = PackageId::main("pkg");
      let label = Label::parse_relative("//other:c", &base).unwrap();
      assert_eq!(label.package_id(), PackageId::main("other"));
    }
  }

  #[test]
  fn serde_uses_string_form() {
    let label = Label::parse("@r//p:n").unwrap();
    let json = serde_json::to_string(&label).unwrap();
    assert_eq!(json, "\"@r//p:n\"");
    let back: Label = serde_json::from_str(&json).unwrap();
    assert_eq!(back, label);

    assert!(serde_json::from_str::<Label>("\":rel\"").is_err());
  }

  #[test]
  fn package_id_roundtrips_through_text() {
    let id = PackageId::parse("@r//a/b").unwrap();
    assert_eq!(id, PackageId::new("r", "a/b"));
    assert_eq!(id.to_string(), "@r//a/b");
  }
}
