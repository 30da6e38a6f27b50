//! Analysis settings.
//!
//! Read from the `settings` table of a workspace file. Every field has a
//! default so an empty table is valid.

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_PLATFORM_MAPPINGS;
use crate::label::Label;

/// Knobs read by the configuration resolver and the build driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
  /// Skip, rather than fail, explicitly requested targets that are
  /// incompatible with the target platform.
  pub skip_incompatible_explicit_targets: bool,
  /// Run every test exclusively.
  pub exclusive_test_strategy: bool,
  /// Tests run on the local machine; `exclusive-if-local` tests become
  /// exclusive.
  pub local_test_execution: bool,
  /// Environments every top-level target must support.
  pub target_environments: Vec<Label>,
  /// Path of the platform mapping file.
  pub platform_mappings: String,
  /// Restart bound for one top-level evaluation.
  pub max_restarts: usize,
}

impl Default for AnalysisSettings {
  fn default() -> Self {
    Self {
      skip_incompatible_explicit_targets: false,
      exclusive_test_strategy: false,
      local_test_execution: false,
      target_environments: Vec::new(),
      platform_mappings: DEFAULT_PLATFORM_MAPPINGS.to_string(),
      max_restarts: 64,
    }
  }
}
