//! In-memory collaborators.
//!
//! Every store runs in one of two modes:
//!
//! - eager: a value is computed the first time it is requested
//! - deferred: requests are recorded and answered with `Pending` until
//!   [`InMemoryStores::settle`] produces them
//!
//! Deferred mode drives the suspend and restart paths of the core the same
//! way a real evaluator would.

mod aspects;
mod configurations;
mod configured;
mod executor;
mod interpreter;
mod lazy;
mod mappings;
mod packages;

use std::sync::Arc;

use tracing::trace;

pub use aspects::DeclaredAspects;
pub use configurations::InternedConfigurations;
pub use configured::StaticConfiguredTargets;
pub use executor::RecordingExecutor;
pub use interpreter::DeclarativeInterpreter;
pub use mappings::MemoryPlatformMappings;
pub use packages::MemoryPackageStore;

use crate::env::ResolutionEnv;
use crate::eval::Interrupt;
use crate::settings::AnalysisSettings;
use crate::transition::TransitionEngine;

/// Every collaborator the resolution core and the driver need, in memory.
pub struct InMemoryStores {
  pub packages: MemoryPackageStore,
  pub mappings: MemoryPlatformMappings,
  pub configurations: InternedConfigurations,
  pub configured_targets: StaticConfiguredTargets,
  pub aspects: DeclaredAspects,
  pub executor: RecordingExecutor,
  pub interpreter: Arc<DeclarativeInterpreter>,
  pub transitions: TransitionEngine,
  pub settings: AnalysisSettings,
  pub interrupt: Interrupt,
}

impl InMemoryStores {
  /// Stores that compute values on first request.
  pub fn new(settings: AnalysisSettings) -> Self {
    Self::with_mode(settings, false)
  }

  /// Stores that only record requests until [`InMemoryStores::settle`].
  pub fn deferred(settings: AnalysisSettings) -> Self {
    Self::with_mode(settings, true)
  }

  fn with_mode(settings: AnalysisSettings, deferred: bool) -> Self {
    let interpreter = Arc::new(DeclarativeInterpreter::new());
    Self {
      packages: MemoryPackageStore::new(deferred),
      mappings: MemoryPlatformMappings::new(deferred),
      configurations: InternedConfigurations::new(deferred),
      configured_targets: StaticConfiguredTargets::new(deferred),
      aspects: DeclaredAspects::new(deferred),
      executor: RecordingExecutor::new(deferred),
      transitions: TransitionEngine::new(interpreter.clone()),
      interpreter,
      settings,
      interrupt: Interrupt::new(),
    }
  }

  pub fn env(&self) -> ResolutionEnv<'_> {
    ResolutionEnv {
      packages: &self.packages,
      mappings: &self.mappings,
      configurations: &self.configurations,
      configured_targets: &self.configured_targets,
      aspects: &self.aspects,
      transitions: &self.transitions,
      settings: &self.settings,
      interrupt: &self.interrupt,
    }
  }

  /// Produce every requested value. Returns how many were produced.
  pub fn settle(&self) -> usize {
    let produced = self.packages.settle()
      + self.mappings.settle()
      + self.configurations.settle()
      + self.configured_targets.settle()
      + self.aspects.settle()
      + self.executor.settle();
    trace!(produced, "settled in-memory stores");
    produced
  }

  /// Number of requested values not produced yet.
  pub fn pending(&self) -> usize {
    self.packages.pending()
      + self.mappings.pending()
      + self.configurations.pending()
      + self.configured_targets.pending()
      + self.aspects.pending()
      + self.executor.pending()
  }
}

impl std::fmt::Debug for InMemoryStores {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InMemoryStores")
      .field("packages", &self.packages.package_count())
      .field("configurations", &self.configurations.len())
      .field("configured_targets", &self.configured_targets.len())
      .field("pending", &self.pending())
      .finish()
  }
}
