//! Analysis of top-level keys.
//!
//! [`SimpleAnalysis`] walks a top-level target's attributes recursively:
//! every dependency edge goes through the configuration resolver and the
//! prerequisite resolver, and every configured node contributes its actions
//! to the closure of the nodes above it. Closures are memoized per
//! configured target, finished values per top-level key.

mod dependencies;
mod error;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

pub use dependencies::DependencyResolver;
pub use error::AnalysisError;

use crate::action::{Action, ActionKey};
use crate::aspect::Aspect;
use crate::config::Configuration;
use crate::driver::{AnalyzedValue, TopLevelKey};
use crate::env::{AnalysisStore, ResolutionEnv};
use crate::eval::{Eval, Halt, Lookup, Pending};
use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};
use crate::target::{RootCause, Target, loading_cause};

/// A configured node and the actions of everything it reaches.
#[derive(Debug, Clone)]
struct Closure {
  node: ConfiguredNode,
  actions: Vec<Action>,
}

/// Results that outlive one analysis attempt.
#[derive(Debug, Default)]
pub struct AnalysisCache {
  values: DashMap<TopLevelKey, Result<Arc<AnalyzedValue>, AnalysisFailure>>,
  closures: DashMap<ConfiguredTargetKey, Arc<Closure>>,
  attempts: AtomicUsize,
}

impl AnalysisCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of analysis attempts, restarts included.
  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::Relaxed)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

/// Analyzes top-level keys on demand.
///
/// Top-level targets live in the root configuration, or in none.
pub struct SimpleAnalysis<'a> {
  env: ResolutionEnv<'a>,
  cache: &'a AnalysisCache,
  root: &'a Arc<Configuration>,
  aspects: &'a BTreeMap<String, Aspect>,
}

impl<'a> SimpleAnalysis<'a> {
  pub fn new(
    env: ResolutionEnv<'a>,
    cache: &'a AnalysisCache,
    root: &'a Arc<Configuration>,
    aspects: &'a BTreeMap<String, Aspect>,
  ) -> Self {
    Self {
      env,
      cache,
      root,
      aspects,
    }
  }

  /// One attempt at analyzing `key`.
  pub fn analyze(&self, key: &TopLevelKey) -> Eval<AnalyzedValue, AnalysisError> {
    let target_key = key.target();
    let label = &target_key.label;
    let configuration = match &target_key.configuration {
      None => None,
      Some(checksum) if checksum == self.root.checksum() => Some(Arc::clone(self.root)),
      Some(_) => return Err(Halt::Failed(AnalysisError::UnknownConfiguration { label: label.clone() })),
    };

    let target = match self.env.fetcher().target(label) {
      Lookup::Pending => return Err(Halt::Suspend(Pending::of(format!("package {}", label.package_id())))),
      Lookup::Ready(Err(error)) => {
        return Err(Halt::Failed(AnalysisError::Loading {
          label: label.clone(),
          root_causes: vec![loading_cause(label, label, &error)],
        }));
      }
      Lookup::Ready(Ok(target)) => target,
    };

    let closure = self.closure(target_key, &target, configuration, &mut Vec::new())?;
    let mut node = closure.node.clone();

    if let TopLevelKey::Aspect(aspect_key) = key {
      let aspect = self
        .aspects
        .get(&aspect_key.aspect)
        .ok_or_else(|| AnalysisError::UnknownAspect {
          aspect: aspect_key.aspect.clone(),
        })?;
      if aspect.applies_to(&node.target.advertised_providers()) {
        let value = match self.env.aspects.apply(aspect, &node) {
          Lookup::Pending => return Err(Halt::Suspend(Pending::of(format!("aspect {aspect_key}")))),
          Lookup::Ready(Err(error)) => return Err(Halt::Failed(error.into())),
          Lookup::Ready(Ok(value)) => value,
        };
        node.merge_aspect(&value).map_err(AnalysisError::from)?;
      }
    }

    Ok(AnalyzedValue::new(key.clone(), node, closure.actions.clone()))
  }

  fn closure(
    &self,
    key: &ConfiguredTargetKey,
    target: &Arc<Target>,
    configuration: Option<Arc<Configuration>>,
    path: &mut Vec<ConfiguredTargetKey>,
  ) -> Eval<Arc<Closure>, AnalysisError> {
    if let Some(done) = self.cache.closures.get(key) {
      return Ok(Arc::clone(done.value()));
    }
    if path.contains(key) {
      let mut cycle = path.clone();
      cycle.push(key.clone());
      return Err(Halt::Failed(AnalysisError::Cycle { path: cycle }));
    }
    if self.env.interrupt.is_triggered() {
      return Err(Halt::Interrupted);
    }

    let node = match self.env.configured_targets.configured_target(key, target, configuration.as_ref()) {
      Lookup::Pending => return Err(Halt::Suspend(Pending::of(format!("configured target {key}")))),
      Lookup::Ready(Err(failure)) => return Err(Halt::Failed(AnalysisError::Target(failure))),
      Lookup::Ready(Ok(node)) => node,
    };

    let mut actions = ActionSet::default();
    actions.extend(&node.actions);
    if let Some(configuration) = &configuration {
      path.push(key.clone());
      let walked = self.dependencies(target, configuration, path, &mut actions);
      path.pop();
      walked?;
    }

    let closure = Arc::new(Closure {
      node: node.as_ref().clone(),
      actions: actions.into_vec(),
    });
    trace!(target = %key, actions = closure.actions.len(), "closure computed");
    self.cache.closures.insert(key.clone(), Arc::clone(&closure));
    Ok(closure)
  }

  /// Walk every attribute, collecting what is missing before suspending and
  /// every loading error before failing.
  fn dependencies(
    &self,
    target: &Target,
    configuration: &Arc<Configuration>,
    path: &mut Vec<ConfiguredTargetKey>,
    actions: &mut ActionSet,
  ) -> Eval<(), AnalysisError> {
    let resolver = DependencyResolver::new(self.env, target, configuration);
    let mut pending = Pending::new();
    let mut causes: Vec<RootCause> = Vec::new();

    for attribute in target.attributes.keys() {
      let dependencies = match resolver.resolve_attribute(attribute, &mut causes) {
        Ok(dependencies) => dependencies,
        Err(Halt::Suspend(missing)) => {
          pending.merge(missing);
          continue;
        }
        Err(halt) => return Err(halt),
      };
      let prerequisites = match resolver.resolve_prerequisites(attribute, &dependencies) {
        Ok(prerequisites) => prerequisites,
        Err(Halt::Suspend(missing)) => {
          pending.merge(missing);
          continue;
        }
        Err(halt) => return Err(halt),
      };
      for prerequisite in prerequisites {
        match self.closure(&prerequisite.key, &prerequisite.target, prerequisite.configuration.clone(), path) {
          Ok(closure) => actions.extend(&closure.actions),
          Err(Halt::Suspend(missing)) => pending.merge(missing),
          Err(halt) => return Err(halt),
        }
      }
    }

    if !pending.is_empty() {
      return Err(Halt::Suspend(pending));
    }
    if !causes.is_empty() {
      return Err(Halt::Failed(AnalysisError::Loading {
        label: target.label.clone(),
        root_causes: causes,
      }));
    }
    Ok(())
  }
}

impl AnalysisStore for SimpleAnalysis<'_> {
  fn analyzed(&self, key: &TopLevelKey) -> Lookup<Result<Arc<AnalyzedValue>, AnalysisFailure>> {
    if let Some(done) = self.cache.values.get(key) {
      return Lookup::Ready(done.value().clone());
    }
    self.cache.attempts.fetch_add(1, Ordering::Relaxed);

    let result = match self.analyze(key) {
      Ok(value) => Ok(Arc::new(value)),
      Err(Halt::Failed(error)) => {
        debug!(key = %key, error = %error, "analysis failed");
        Err(error.into_failure(key.label()))
      }
      Err(Halt::Suspend(pending)) => {
        trace!(key = %key, pending = %pending, "analysis suspended");
        return Lookup::Pending;
      }
      Err(Halt::Interrupted) => return Lookup::Pending,
    };
    let stored = self.cache.values.entry(key.clone()).or_insert(result).value().clone();
    Lookup::Ready(stored)
  }
}

/// Actions in first-seen order, each at most once.
#[derive(Default)]
struct ActionSet {
  seen: HashSet<ActionKey>,
  actions: Vec<Action>,
}

impl ActionSet {
  fn extend<'a>(&mut self, actions: impl IntoIterator<Item = &'a Action>) {
    for action in actions {
      if self.seen.insert(action.key.clone()) {
        self.actions.push(action.clone());
      }
    }
  }

  fn into_vec(self) -> Vec<Action> {
    self.actions
  }
}
