//! Actions registered by configured targets and the artifacts they produce.
//!
//! Actions are derived from a target's declared [`ActionTemplate`]s once the
//! target has a configuration. Output paths are rooted at the configuration
//! mnemonic so the same target in two configurations never collides:
//!
//! ```text
//! <mnemonic>/<package>/<output>     e.g. k8-fastbuild/lib/a.o
//! src/<package>/<output>            configuration-less targets
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Configuration;
use crate::consts::SOURCE_ROOT;
use crate::node::ConfiguredTargetKey;
use crate::target::ActionTemplate;

/// Identifies one action: its owner and its index among the owner's actions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionKey {
  pub owner: ConfiguredTargetKey,
  pub index: usize,
}

impl fmt::Display for ActionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.owner, self.index)
  }
}

/// A file produced by an action, addressed by its output path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact(pub String);

impl fmt::Display for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
  pub key: ActionKey,
  pub mnemonic: String,
  pub outputs: Vec<Artifact>,
}

impl Action {
  /// Instantiate a declared action for one configured target.
  pub fn from_template(
    owner: &ConfiguredTargetKey,
    configuration: Option<&Configuration>,
    index: usize,
    template: &ActionTemplate,
  ) -> Self {
    let root = configuration.map_or(SOURCE_ROOT, |c| c.mnemonic());
    let package = owner.label.package();
    let outputs = template
      .outputs
      .iter()
      .map(|output| {
        if package.is_empty() {
          Artifact(format!("{root}/{output}"))
        } else {
          Artifact(format!("{root}/{package}/{output}"))
        }
      })
      .collect();
    Self {
      key: ActionKey {
        owner: owner.clone(),
        index,
      },
      mnemonic: template.mnemonic.clone(),
      outputs,
    }
  }

  /// Two actions are shareable when they would do the same work: same
  /// mnemonic and the same outputs. Shareable actions never conflict.
  pub fn is_shareable_with(&self, other: &Action) -> bool {
    self.mnemonic == other.mnemonic && self.outputs == other.outputs
  }
}

/// Two actions claim the same output.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("file '{artifact}' is generated by both {first} ({first_mnemonic}) and {second} ({second_mnemonic})")]
pub struct ConflictError {
  pub artifact: Artifact,
  pub first: ActionKey,
  pub first_mnemonic: String,
  pub second: ActionKey,
  pub second_mnemonic: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{BuildOptions, ConfigurationKey};
  use crate::util::testutil::label;

  fn template(mnemonic: &str, outputs: &[&str]) -> ActionTemplate {
    ActionTemplate {
      mnemonic: mnemonic.to_string(),
      outputs: outputs.iter().map(|o| o.to_string()).collect(),
    }
  }

  #[test]
  fn outputs_are_rooted_at_mnemonic() {
    let configuration = Configuration::create(&ConfigurationKey::new(BuildOptions::new().with("cpu", "arm"))).unwrap();
    let owner = ConfiguredTargetKey::new(label("//lib:a"), Some(&configuration));
    let action = Action::from_template(&owner, Some(&configuration), 0, &template("CppCompile", &["a.o"]));
    assert_eq!(action.outputs, vec![Artifact("arm-fastbuild/lib/a.o".to_string())]);
    assert_eq!(action.key.index, 0);
  }

  #[test]
  fn configuration_less_outputs_use_source_root() {
    let owner = ConfiguredTargetKey::new(label("//data:files"), None);
    let action = Action::from_template(&owner, None, 1, &template("Copy", &["x.txt"]));
    assert_eq!(action.outputs[0].0, "src/data/x.txt");
  }

  #[test]
  fn shareable_requires_same_work() {
    let a = ConfiguredTargetKey::new(label("//lib:a"), None);
    let b = ConfiguredTargetKey::new(label("//lib:b"), None);
    let first = Action::from_template(&a, None, 0, &template("Copy", &["x"]));
    let same = Action::from_template(&b, None, 0, &template("Copy", &["x"]));
    let other = Action::from_template(&b, None, 0, &template("Link", &["x"]));
    assert!(first.is_shareable_with(&same));
    assert!(!first.is_shareable_with(&other));
  }
}
