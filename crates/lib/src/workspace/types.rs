//! Serde model of a workspace file.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "settings": { "max_restarts": 16 },
//!   "configuration": { "cpu": "k8" },
//!   "transitions": {
//!     "fat": { "type": "split", "branches": { "arm": { "cpu": "arm" }, "k8": { "cpu": "k8" } } }
//!   },
//!   "aspects": [{ "name": "lint" }],
//!   "packages": {
//!     "//app": [
//!       { "name": "main", "kind": "rule", "rule_class": "cc_binary",
//!         "attributes": { "deps": [":lib"] }, "transitions": { "deps": "fat" },
//!         "outputs": ["main"] }
//!     ]
//!   },
//!   "top_level": [{ "label": "//app:main", "aspects": ["lint"] }]
//! }
//! ```
//!
//! Labels inside a package may be relative to it (`:lib`). Everything else
//! takes absolute labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aspect::Aspect;
use crate::config::BuildOptions;
use crate::label::Label;
use crate::provider::{ProviderId, ProviderValue};
use crate::settings::AnalysisSettings;
use crate::target::{ActionTemplate, TargetKind};
use crate::util::hash::Hashable;

/// Current workspace file format version.
pub const WORKSPACE_VERSION: u32 = 1;

/// Mnemonic of the action declared through a target's `outputs` shorthand.
pub const DEFAULT_MNEMONIC: &str = "Build";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceFile {
  pub version: u32,
  pub settings: AnalysisSettings,
  /// Run every store in deferred mode, so evaluation suspends and restarts.
  pub deferred: bool,
  /// Options of the top-level configuration.
  pub configuration: BuildOptions,
  /// Platform mapping file contents, keyed by path.
  pub platform_mappings: BTreeMap<String, String>,
  /// Named transitions targets refer to.
  pub transitions: BTreeMap<String, TransitionDef>,
  pub aspects: Vec<Aspect>,
  /// Package id (`//pkg` or `@repo//pkg`) to its targets.
  pub packages: BTreeMap<String, Vec<TargetDef>>,
  pub top_level: Vec<TopLevelDef>,
  pub failures: FailureDefs,
}

impl Default for WorkspaceFile {
  fn default() -> Self {
    Self {
      version: WORKSPACE_VERSION,
      settings: AnalysisSettings::default(),
      deferred: false,
      configuration: BuildOptions::new(),
      platform_mappings: BTreeMap::new(),
      transitions: BTreeMap::new(),
      aspects: Vec::new(),
      packages: BTreeMap::new(),
      top_level: Vec::new(),
      failures: FailureDefs::default(),
    }
  }
}

impl Hashable for WorkspaceFile {}

/// A declarative transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionDef {
  /// Keep the current configuration.
  None,
  Set {
    options: BuildOptions,
  },
  Split {
    branches: BTreeMap<String, BuildOptions>,
  },
  /// Move into the execution configuration of `platform`.
  Exec {
    platform: Label,
  },
  /// Evaluated by the declarative interpreter. `source` is one of
  /// `{"set": {..}}`, `{"branches": {..}}` or `{"error": ".."}`.
  User {
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
    source: serde_json::Value,
  },
}

/// One target of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDef {
  pub name: String,
  #[serde(flatten)]
  pub kind: TargetKind,
  #[serde(default)]
  pub attributes: BTreeMap<String, Vec<String>>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub providers: BTreeMap<ProviderId, ProviderValue>,
  /// Shorthand for one [`DEFAULT_MNEMONIC`] action producing these files.
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default)]
  pub actions: Vec<ActionTemplate>,
  #[serde(default)]
  pub restricted_to: Vec<String>,
  #[serde(default)]
  pub incompatible: Option<String>,
  /// Name of the transition applied to incoming edges.
  #[serde(default)]
  pub incoming_transition: Option<String>,
  /// Attribute name to transition name.
  #[serde(default)]
  pub transitions: BTreeMap<String, String>,
  /// Attribute name to the aspects it propagates.
  #[serde(default)]
  pub aspects: BTreeMap<String, Vec<String>>,
}

fn explicit_by_default() -> bool {
  true
}

/// A requested top-level target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelDef {
  pub label: Label,
  /// `false` for targets reached through a pattern.
  #[serde(default = "explicit_by_default")]
  pub explicit: bool,
  /// Aspects requested on top of the target, each its own top-level key.
  #[serde(default)]
  pub aspects: Vec<String>,
}

/// Failures to inject into the in-memory stores, keyed by subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureDefs {
  /// Package id to a build file error.
  pub packages: BTreeMap<String, String>,
  /// Configured targets whose analysis fails.
  pub targets: BTreeMap<Label, String>,
  /// Aspects whose evaluation fails.
  pub aspects: BTreeMap<String, String>,
  /// Output paths whose execution fails.
  pub artifacts: BTreeMap<String, String>,
}
