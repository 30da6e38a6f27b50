//! Error types for configuration creation and resolution.

use thiserror::Error;

use crate::label::Label;
use crate::transition::TransitionError;

/// Errors raised while turning option sets into configurations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
  /// An option has a value the configuration cannot accept.
  #[error("invalid value for option '{name}': {reason}")]
  InvalidOption { name: String, reason: String },

  /// The platform mapping file could not be parsed.
  #[error("cannot parse platform mapping '{path}': {message}")]
  PlatformMapping { path: String, message: String },

  /// The platform mapping file does not exist.
  #[error("platform mapping '{path}' not found")]
  MissingPlatformMapping { path: String },
}

/// What went wrong while creating a dependency's configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CreationReason {
  #[error("transition failed: {0}")]
  Transition(#[from] TransitionError),

  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
}

/// A configuration could not be created for one dependency edge.
///
/// Carries the requesting target and its configuration so diagnostics can
/// point at the edge rather than at the dependency alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot configure {dependency} for {target} ({configuration}): {reason}")]
pub struct ConfigurationCreationError {
  pub target: Label,
  /// Short identifier of the requesting configuration.
  pub configuration: String,
  pub dependency: Label,
  pub reason: CreationReason,
}
