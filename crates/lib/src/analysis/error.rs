//! Analysis errors and their root causes.

use thiserror::Error;

use crate::aspect::AspectError;
use crate::config::ConfigurationCreationError;
use crate::label::Label;
use crate::node::{AnalysisFailure, ConfiguredTargetKey};
use crate::prereq::{CreationError, VisibilityError};
use crate::target::RootCause;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
  /// One or more dependencies could not be loaded.
  #[error("{} dependenc(ies) of {label} failed to load", .root_causes.len())]
  Loading { label: Label, root_causes: Vec<RootCause> },

  /// An attribute names the same label more than once.
  #[error("label '{label}' is duplicated in the '{attribute}' attribute of {target}")]
  DuplicateLabel {
    target: Label,
    attribute: String,
    label: Label,
  },

  #[error(transparent)]
  Configuration(#[from] ConfigurationCreationError),

  #[error(transparent)]
  Visibility(#[from] VisibilityError),

  #[error(transparent)]
  Prerequisite(#[from] CreationError),

  #[error(transparent)]
  Aspect(#[from] AspectError),

  /// The configured target store failed.
  #[error(transparent)]
  Target(#[from] AnalysisFailure),

  #[error("dependency cycle: {}", .path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
  Cycle { path: Vec<ConfiguredTargetKey> },

  #[error("unknown aspect '{aspect}'")]
  UnknownAspect { aspect: String },

  /// Top-level keys must be in the root configuration or none.
  #[error("{label} was requested in a configuration this session did not create")]
  UnknownConfiguration { label: Label },
}

impl AnalysisError {
  /// The failure reported for the top-level `label`.
  pub fn into_failure(self, label: &Label) -> AnalysisFailure {
    let root_causes = match &self {
      AnalysisError::Target(failure) => return failure.clone(),
      AnalysisError::Loading { root_causes, .. } => root_causes.clone(),
      AnalysisError::Prerequisite(error) if !error.root_causes.is_empty() => error.root_causes.clone(),
      AnalysisError::Prerequisite(error) => vec![RootCause::Analysis {
        label: error.label.clone(),
        message: error.message.clone(),
      }],
      other => vec![RootCause::Analysis {
        label: label.clone(),
        message: other.to_string(),
      }],
    };
    AnalysisFailure {
      label: label.clone(),
      message: self.to_string(),
      root_causes,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::LoadingFailureKind;
  use crate::util::testutil::label;

  #[test]
  fn loading_errors_keep_every_cause() {
    let cause = |to: &str| RootCause::Loading {
      from: label("//app:main"),
      to: label(to),
      culprit: to.to_string(),
      kind: LoadingFailureKind::TargetDefinition,
      message: "missing".to_string(),
    };
    let error = AnalysisError::Loading {
      label: label("//app:main"),
      root_causes: vec![cause("//a:x"), cause("//b:y")],
    };
    let failure = error.into_failure(&label("//app:main"));
    assert_eq!(failure.root_causes.len(), 2);
    assert!(failure.message.contains("2 dependenc(ies)"));
  }

  #[test]
  fn other_errors_blame_the_top_level_target() {
    let failure = AnalysisError::UnknownAspect {
      aspect: "lint".to_string(),
    }
    .into_failure(&label("//app:main"));
    assert_eq!(
      failure.root_causes,
      vec![RootCause::Analysis {
        label: label("//app:main"),
        message: "unknown aspect 'lint'".to_string()
      }]
    );
  }
}
