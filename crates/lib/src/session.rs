//! One build over in-memory stores.
//!
//! A session evaluates every requested key in parallel waves. Keys that
//! suspend are collected, the stores settle, and the suspended keys run
//! again until they finish, stop making progress, or exhaust the restart
//! bound. Exclusive tests then run one at a time, and the generation ends.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{AnalysisCache, AnalysisError, DependencyResolver, SimpleAnalysis};
use crate::aspect::{Aspect, AspectKey};
use crate::config::Configuration;
use crate::dependency::Dependency;
use crate::driver::{
  AnalyzedValue, BuildDriver, BuildDriverKey, BuildDriverValue, DriverError, ExecutionKey, Generation,
  OutputConflictChecker, TestType, TopLevelKey,
};
use crate::env::{AnalysisStore, DriverEnv};
use crate::eval::{Eval, Halt, Lookup, Pending, Settled, Unsettled, settle_loop};
use crate::event::EventSink;
use crate::label::Label;
use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};
use crate::provider::ProviderId;
use crate::store::InMemoryStores;
use crate::target::{RootCause, loading_cause};
use crate::util::hash::Checksum;

type Outcome = Result<BuildDriverValue, Unsettled<DriverError>>;

pub struct Session<'a> {
  stores: &'a InMemoryStores,
  root: Arc<Configuration>,
  aspects: &'a BTreeMap<String, Aspect>,
  cache: AnalysisCache,
  generation: Generation,
}

impl<'a> Session<'a> {
  pub fn new(stores: &'a InMemoryStores, root: Arc<Configuration>, aspects: &'a BTreeMap<String, Aspect>) -> Self {
    Self {
      stores,
      root,
      aspects,
      cache: AnalysisCache::new(),
      generation: Generation::new(),
    }
  }

  pub fn root(&self) -> &Arc<Configuration> {
    &self.root
  }

  pub fn generation(&self) -> &Generation {
    &self.generation
  }

  /// `label` in the root configuration.
  pub fn target_key(&self, label: Label) -> TopLevelKey {
    TopLevelKey::Target(ConfiguredTargetKey::new(label, Some(&self.root)))
  }

  pub fn aspect_key(&self, aspect: impl Into<String>, label: Label) -> TopLevelKey {
    TopLevelKey::Aspect(AspectKey {
      aspect: aspect.into(),
      target: ConfiguredTargetKey::new(label, Some(&self.root)),
    })
  }

  /// Analyze one key, settling the stores as often as needed.
  pub fn analyze(&self, key: &TopLevelKey) -> Result<Settled<Arc<AnalyzedValue>>, Unsettled<AnalysisFailure>> {
    let analysis = self.analysis();
    settle_loop(
      || -> Eval<Arc<AnalyzedValue>, AnalysisFailure> {
        match analysis.analyzed(key) {
          Lookup::Ready(Ok(value)) => Ok(value),
          Lookup::Ready(Err(failure)) => Err(Halt::Failed(failure)),
          Lookup::Pending => Err(Halt::Suspend(Pending::of(format!("analysis {key}")))),
        }
      },
      || self.stores.settle(),
      self.stores.settings.max_restarts,
    )
  }

  /// Resolve one attribute of `label` in the root configuration.
  pub fn resolve(&self, label: &Label, attribute: &str) -> Result<Settled<Resolution>, Unsettled<AnalysisError>> {
    settle_loop(
      || self.resolve_once(label, attribute),
      || self.stores.settle(),
      self.stores.settings.max_restarts,
    )
  }

  fn resolve_once(&self, label: &Label, attribute: &str) -> Eval<Resolution, AnalysisError> {
    let env = self.stores.env();
    let target = match env.fetcher().target(label) {
      Lookup::Pending => return Err(Halt::Suspend(Pending::of(format!("package {}", label.package_id())))),
      Lookup::Ready(Err(error)) => {
        return Err(Halt::Failed(AnalysisError::Loading {
          label: label.clone(),
          root_causes: vec![loading_cause(label, label, &error)],
        }));
      }
      Lookup::Ready(Ok(target)) => target,
    };

    let resolver = DependencyResolver::new(env, &target, &self.root);
    let mut root_causes: Vec<RootCause> = Vec::new();
    let dependencies = resolver.resolve_attribute(attribute, &mut root_causes)?;
    let nodes = resolver.resolve_prerequisites(attribute, &dependencies)?;
    Ok(Resolution {
      target: label.clone(),
      attribute: attribute.to_string(),
      dependencies: dependencies.iter().map(ResolvedEdge::from).collect(),
      nodes: nodes.iter().map(ResolvedNode::from).collect(),
      root_causes,
    })
  }

  /// Drive every request to a terminal outcome and end the generation.
  pub fn build(&self, requests: &[BuildDriverKey], events: &dyn EventSink) -> BuildReport {
    let analysis = self.analysis();
    let driver = BuildDriver::new(DriverEnv {
      analysis: &analysis,
      conflicts: &OutputConflictChecker,
      execution: &self.stores.executor,
      events,
      packages: &self.stores.packages,
      generation: &self.generation,
      settings: &self.stores.settings,
      interrupt: &self.stores.interrupt,
    });
    let max_restarts = self.stores.settings.max_restarts;
    let generation = self.generation.number();
    info!(generation, keys = requests.len(), "build started");

    let mut outcomes: BTreeMap<BuildDriverKey, Outcome> = BTreeMap::new();
    let mut remaining: Vec<&BuildDriverKey> = requests.iter().collect();
    let mut restarts = 0;
    while !remaining.is_empty() {
      let attempts: Vec<(&BuildDriverKey, Eval<BuildDriverValue, DriverError>)> =
        remaining.par_iter().map(|key| (*key, driver.evaluate(key))).collect();

      let mut suspended: Vec<(&BuildDriverKey, Pending)> = Vec::new();
      for (key, attempt) in attempts {
        match attempt {
          Ok(value) => {
            outcomes.insert(key.clone(), Ok(value));
          }
          Err(Halt::Failed(error)) => {
            outcomes.insert(key.clone(), Err(Unsettled::Failed(error)));
          }
          Err(Halt::Interrupted) => {
            outcomes.insert(key.clone(), Err(Unsettled::Interrupted));
          }
          Err(Halt::Suspend(pending)) => suspended.push((key, pending)),
        }
      }
      if suspended.is_empty() {
        break;
      }

      let produced = if restarts < max_restarts { self.stores.settle() } else { 0 };
      if produced == 0 {
        for (key, pending) in suspended {
          warn!(key = %key, pending = %pending, restarts, "key did not settle");
          let unsettled = if restarts >= max_restarts {
            Unsettled::Exhausted { restarts, pending }
          } else {
            Unsettled::Stalled { restarts, pending }
          };
          outcomes.insert(key.clone(), Err(unsettled));
        }
        break;
      }
      restarts += 1;
      remaining = suspended.into_iter().map(|(key, _)| key).collect();
    }

    for outcome in outcomes.values_mut() {
      let Ok(value) = outcome else {
        continue;
      };
      if value.exclusive_test.is_none() {
        continue;
      }
      let value = value.clone();
      if let Err(unsettled) = settle_loop(
        || driver.run_exclusive_test(&value),
        || self.stores.settle(),
        max_restarts,
      ) {
        *outcome = Err(unsettled);
      }
    }

    let next = self.generation.finish();
    let report = BuildReport {
      generation,
      restarts,
      targets: outcomes.into_iter().map(|(key, outcome)| TargetReport::new(key, outcome)).collect(),
      executed: self.stores.executor.executed(),
    };
    info!(
      generation,
      next,
      built = report.count(TargetStatus::Built),
      skipped = report.count(TargetStatus::Skipped),
      failed = report.count(TargetStatus::Failed),
      "build finished"
    );
    report
  }

  fn analysis(&self) -> SimpleAnalysis<'_> {
    SimpleAnalysis::new(self.stores.env(), &self.cache, &self.root, self.aspects)
  }
}

/// One configured edge of a resolved attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEdge {
  pub label: Label,
  /// `None` for configuration-less targets.
  pub configuration: Option<Checksum>,
  pub mnemonic: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub transition_keys: Vec<String>,
}

impl From<&Dependency> for ResolvedEdge {
  fn from(dependency: &Dependency) -> Self {
    Self {
      label: dependency.label.clone(),
      configuration: dependency.configuration.as_ref().map(|c| c.checksum().clone()),
      mnemonic: dependency.configuration.as_ref().map(|c| c.mnemonic().to_string()),
      transition_keys: dependency.transition_keys.clone(),
    }
  }
}

/// A configured node a resolved attribute points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedNode {
  pub key: ConfiguredTargetKey,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub transition_keys: Vec<String>,
  pub providers: Vec<ProviderId>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub aspects: Vec<String>,
}

impl From<&ConfiguredNode> for ResolvedNode {
  fn from(node: &ConfiguredNode) -> Self {
    Self {
      key: node.key.clone(),
      transition_keys: node.transition_keys.clone(),
      providers: node.providers.ids().cloned().collect(),
      aspects: node.aspects.clone(),
    }
  }
}

/// Dependencies and configured nodes of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
  pub target: Label,
  pub attribute: String,
  pub dependencies: Vec<ResolvedEdge>,
  pub nodes: Vec<ResolvedNode>,
  /// Labels that failed to load and were left out.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub root_causes: Vec<RootCause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
  Built,
  Skipped,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub key: TopLevelKey,
  pub label: Label,
  pub status: TargetStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub test_type: Option<TestType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  /// A later generation may succeed without changes.
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub transient: bool,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub root_causes: Vec<RootCause>,
}

impl TargetReport {
  fn new(key: BuildDriverKey, outcome: Outcome) -> Self {
    let label = key.top_level.label().clone();
    let mut report = Self {
      key: key.top_level,
      label,
      status: TargetStatus::Built,
      test_type: None,
      message: None,
      transient: false,
      root_causes: Vec::new(),
    };
    match outcome {
      Ok(value) => {
        report.test_type = value.test_type.is_test().then_some(value.test_type);
        if let Some(reason) = value.skipped {
          report.status = TargetStatus::Skipped;
          report.message = Some(reason);
        }
      }
      Err(unsettled) => {
        report.status = TargetStatus::Failed;
        report.message = Some(unsettled.to_string());
        if let Unsettled::Failed(error) = unsettled {
          report.transient = error.is_transient();
          if let DriverError::Analysis(failure) = error {
            report.root_causes = failure.root_causes;
          }
        }
      }
    }
    report
  }
}

/// What one build did, per requested key.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
  pub generation: u64,
  /// Settle rounds the build needed.
  pub restarts: usize,
  pub targets: Vec<TargetReport>,
  /// Execution keys in the order they ran.
  pub executed: Vec<ExecutionKey>,
}

impl BuildReport {
  pub fn success(&self) -> bool {
    self.count(TargetStatus::Failed) == 0
  }

  pub fn count(&self, status: TargetStatus) -> usize {
    self.targets.iter().filter(|target| target.status == status).count()
  }

  pub fn target(&self, label: &Label) -> Option<&TargetReport> {
    self.targets.iter().find(|target| &target.label == label)
  }
}
