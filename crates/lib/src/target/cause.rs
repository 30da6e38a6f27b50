//! Root causes: why an edge could not be resolved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Distinguishes failures by what the user has to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingFailureKind {
  /// A package or target definition is missing or malformed.
  TargetDefinition,
  /// An external repository could not be fetched.
  RepositoryFetch,
}

impl LoadingFailureKind {
  pub fn remediation(&self) -> &'static str {
    match self {
      LoadingFailureKind::TargetDefinition => "check the target definition and its package",
      LoadingFailureKind::RepositoryFetch => "check the repository definition and network access",
    }
  }
}

/// A typed record of why a target or edge failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RootCause {
  /// A dependency could not be loaded.
  Loading {
    /// Target whose edge failed.
    from: Label,
    /// Label the edge points at.
    to: Label,
    /// Label or package the failure is about.
    culprit: String,
    kind: LoadingFailureKind,
    message: String,
  },
  /// A target failed to analyze.
  Analysis { label: Label, message: String },
}

impl RootCause {
  pub fn label(&self) -> &Label {
    match self {
      RootCause::Loading { from, .. } => from,
      RootCause::Analysis { label, .. } => label,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, RootCause::Loading { .. })
  }
}

impl fmt::Display for RootCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RootCause::Loading {
        from,
        to,
        culprit,
        kind,
        message,
      } => write!(
        f,
        "{from} -> {to}: {message} (in {culprit}; {})",
        kind.remediation()
      ),
      RootCause::Analysis { label, message } => write!(f, "{label}: {message}"),
    }
  }
}

/// Receives root causes as they are found.
///
/// Decoupled from the code that finds them so callers decide whether to
/// collect, log or forward.
pub trait RootCauseHook {
  fn report(&mut self, cause: RootCause);
}

impl RootCauseHook for Vec<RootCause> {
  fn report(&mut self, cause: RootCause) {
    self.push(cause);
  }
}
