//! Collaborator contracts consumed by the resolution core.
//!
//! Every potentially slow lookup returns [`Lookup`]: either the value, or
//! `Pending` after recording the request so the evaluator can produce it
//! before re-invoking the caller. Nothing here blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::{Action, ActionKey, ConflictError};
use crate::aspect::{Aspect, AspectError, AspectValue};
use crate::config::{BuildOptions, Configuration, ConfigurationError, ConfigurationKey, OptionValue, PlatformMapping};
use crate::driver::{AnalyzedValue, ExecutionFailure, ExecutionKey, Generation, TopLevelKey};
use crate::eval::{Interrupt, Lookup};
use crate::event::EventSink;
use crate::label::PackageId;
use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};
use crate::settings::AnalysisSettings;
use crate::target::{Package, PackageLoadError, Target, TargetFetcher};
use crate::transition::{TransitionEngine, TransitionError, TransitionOutputs, UserTransition};

/// Loads packages.
pub trait PackageStore: Send + Sync {
  fn package(&self, id: &PackageId) -> Lookup<Result<Arc<Package>, PackageLoadError>>;
}

/// Evaluates user-defined transitions.
pub trait TransitionInterpreter: Send + Sync {
  /// `inputs` holds the value of every declared input setting.
  fn evaluate(
    &self,
    transition: &UserTransition,
    options: &BuildOptions,
    inputs: &BTreeMap<String, OptionValue>,
  ) -> Result<TransitionOutputs, TransitionError>;
}

/// Loads and parses platform mapping files.
pub trait PlatformMappingStore: Send + Sync {
  fn mapping(&self, path: &str) -> Lookup<Result<Arc<PlatformMapping>, ConfigurationError>>;
}

/// Interns configurations by key.
pub trait ConfigurationCache: Send + Sync {
  fn configuration(&self, key: &ConfigurationKey) -> Lookup<Result<Arc<Configuration>, ConfigurationError>>;
}

/// Produces configured nodes (a target analyzed in one configuration).
pub trait ConfiguredTargetStore: Send + Sync {
  fn configured_target(
    &self,
    key: &ConfiguredTargetKey,
    target: &Arc<Target>,
    configuration: Option<&Arc<Configuration>>,
  ) -> Lookup<Result<Arc<ConfiguredNode>, AnalysisFailure>>;
}

/// Applies one aspect to one configured node.
pub trait AspectApplier: Send + Sync {
  fn apply(&self, aspect: &Aspect, node: &ConfiguredNode) -> Lookup<Result<AspectValue, AspectError>>;
}

/// Everything dependency resolution reads.
#[derive(Clone, Copy)]
pub struct ResolutionEnv<'a> {
  pub packages: &'a dyn PackageStore,
  pub mappings: &'a dyn PlatformMappingStore,
  pub configurations: &'a dyn ConfigurationCache,
  pub configured_targets: &'a dyn ConfiguredTargetStore,
  pub aspects: &'a dyn AspectApplier,
  pub transitions: &'a TransitionEngine,
  pub settings: &'a AnalysisSettings,
  pub interrupt: &'a Interrupt,
}

impl<'a> ResolutionEnv<'a> {
  pub fn fetcher(&self) -> TargetFetcher<'a> {
    TargetFetcher::new(self.packages)
  }
}

/// Produces analyzed values for top-level keys.
pub trait AnalysisStore: Send + Sync {
  fn analyzed(&self, key: &TopLevelKey) -> Lookup<Result<Arc<AnalyzedValue>, AnalysisFailure>>;
}

/// Finds actions that cannot coexist in one build.
pub trait ActionConflictChecker: Send + Sync {
  /// `actions` is the transitive action closure of one top-level key.
  fn find_conflicts(&self, actions: &[Action]) -> BTreeMap<ActionKey, ConflictError>;
}

/// Requests execution. `Pending` until every requested key is done.
pub trait ExecutionRequester: Send + Sync {
  fn request(&self, keys: &[ExecutionKey]) -> Lookup<Result<(), ExecutionFailure>>;
}

/// Everything the build driver reads.
#[derive(Clone, Copy)]
pub struct DriverEnv<'a> {
  pub analysis: &'a dyn AnalysisStore,
  pub conflicts: &'a dyn ActionConflictChecker,
  pub execution: &'a dyn ExecutionRequester,
  pub events: &'a dyn EventSink,
  pub packages: &'a dyn PackageStore,
  pub generation: &'a Generation,
  pub settings: &'a AnalysisSettings,
  pub interrupt: &'a Interrupt,
}

impl<'a> DriverEnv<'a> {
  pub fn fetcher(&self) -> TargetFetcher<'a> {
    TargetFetcher::new(self.packages)
  }
}
