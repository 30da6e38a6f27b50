//! Resolve dependency edges to configured dependencies.
//!
//! For one edge the resolver:
//! 1. returns a configuration-less dependency for `Null` transitions and
//!    visibility edges, recording split keys for bookkeeping
//! 2. applies the transition and reuses the current configuration when the
//!    result is option-for-option identical to it
//! 3. maps every resulting option set through the platform mapping and
//!    requests the matching configuration
//! 4. returns one dependency per configuration, ordered by mnemonic and
//!    checksum

use std::sync::Arc;

use tracing::{debug, trace};

use super::configuration::Configuration;
use super::platform_mapping::PlatformMapping;
use super::types::{ConfigurationCreationError, CreationReason};
use crate::dependency::{Dependency, DependencyKey, DependencyKind};
use crate::env::ResolutionEnv;
use crate::eval::{Eval, Halt, Lookup, Pending};
use crate::label::Label;
use crate::transition::{Applied, Transition};
use crate::util::hash::Checksum;

/// Resolves the edges of one target in one configuration.
pub struct ConfigurationResolver<'a> {
  env: ResolutionEnv<'a>,
  target: &'a Label,
  current: &'a Arc<Configuration>,
}

impl<'a> ConfigurationResolver<'a> {
  pub fn new(env: ResolutionEnv<'a>, target: &'a Label, current: &'a Arc<Configuration>) -> Self {
    Self { env, target, current }
  }

  /// Resolve a single edge.
  pub fn resolve(&self, kind: &DependencyKind, key: &DependencyKey) -> Eval<Vec<Dependency>, ConfigurationCreationError> {
    if self.env.interrupt.is_triggered() {
      return Err(Halt::Interrupted);
    }

    if matches!(kind, DependencyKind::Visibility) {
      return Ok(vec![Dependency::configuration_less(key, Vec::new())]);
    }

    if key.transition.is_null() {
      let transition_keys = self.split_keys(kind, key)?;
      return Ok(vec![Dependency::configuration_less(key, transition_keys)]);
    }

    let branches = match self.apply(&key.transition, key)? {
      Applied::ConfigurationLess => return Ok(vec![Dependency::configuration_less(key, Vec::new())]),
      Applied::Options(branches) => branches,
    };

    if branches.len() == 1 && branches.values().all(|options| options == self.current.options()) {
      trace!(target = %self.target, dependency = %key.label, "no-op transition");
      return Ok(vec![Dependency::configured(key, Arc::clone(self.current), Vec::new())]);
    }

    let mapping = self.platform_mapping(key)?;

    let mut pending = Pending::new();
    let mut resolved = Vec::with_capacity(branches.len());
    for (transition_key, options) in branches {
      let config_key = mapping
        .map(&options)
        .map_err(|e| self.creation_error(key, CreationReason::Configuration(e)))?;
      match self.env.configurations.configuration(&config_key) {
        Lookup::Pending => pending.request(format!("configuration {}", config_key.checksum().short())),
        Lookup::Ready(Ok(configuration)) => {
          resolved.push(Dependency::configured(key, configuration, vec![transition_key]));
        }
        Lookup::Ready(Err(error)) => {
          return Err(Halt::Failed(self.creation_error(key, CreationReason::Configuration(error))));
        }
      }
    }
    if !pending.is_empty() {
      return Err(Halt::Suspend(pending));
    }

    resolved.sort_by(|a, b| dependency_order(a).cmp(&dependency_order(b)));
    debug!(
      target = %self.target,
      dependency = %key.label,
      configurations = resolved.len(),
      "resolved dependency configurations"
    );
    Ok(resolved)
  }

  /// Resolve a batch of edges of the same kind.
  ///
  /// Output order follows input order; a label's split outputs stay
  /// contiguous. Every edge is attempted before suspending so one
  /// suspension reports everything missing.
  pub fn resolve_all(
    &self,
    kind: &DependencyKind,
    keys: &[DependencyKey],
  ) -> Eval<Vec<Dependency>, ConfigurationCreationError> {
    let mut pending = Pending::new();
    let mut resolved = Vec::with_capacity(keys.len());
    for key in keys {
      match self.resolve(kind, key) {
        Ok(dependencies) => resolved.extend(dependencies),
        Err(Halt::Suspend(missing)) => pending.merge(missing),
        Err(halt) => return Err(halt),
      }
    }
    if !pending.is_empty() {
      return Err(Halt::Suspend(pending));
    }
    Ok(resolved)
  }

  /// Keys of the attribute's split transition, for configuration-less edges.
  fn split_keys(&self, kind: &DependencyKind, key: &DependencyKey) -> Eval<Vec<String>, ConfigurationCreationError> {
    let DependencyKind::Attribute { split: Some(split), .. } = kind else {
      return Ok(Vec::new());
    };
    match self.apply(split, key)? {
      Applied::ConfigurationLess => Ok(Vec::new()),
      Applied::Options(branches) => Ok(branches.into_keys().collect()),
    }
  }

  fn apply(&self, transition: &Transition, key: &DependencyKey) -> Eval<Applied, ConfigurationCreationError> {
    self
      .env
      .transitions
      .apply(
        self.current.options(),
        transition,
        &self.env.fetcher(),
        self.env.interrupt,
      )
      .map_err(|halt| halt.map_failed(|e| self.creation_error(key, CreationReason::Transition(e))))
  }

  fn platform_mapping(&self, key: &DependencyKey) -> Eval<Arc<PlatformMapping>, ConfigurationCreationError> {
    let path = &self.env.settings.platform_mappings;
    match self.env.mappings.mapping(path) {
      Lookup::Pending => Err(Halt::Suspend(Pending::of(format!("platform mapping {path}")))),
      Lookup::Ready(Ok(mapping)) => Ok(mapping),
      Lookup::Ready(Err(error)) => Err(Halt::Failed(self.creation_error(key, CreationReason::Configuration(error)))),
    }
  }

  fn creation_error(&self, key: &DependencyKey, reason: CreationReason) -> ConfigurationCreationError {
    ConfigurationCreationError {
      target: self.target.clone(),
      configuration: self.current.short_id(),
      dependency: key.label.clone(),
      reason,
    }
  }
}

fn dependency_order(dependency: &Dependency) -> Option<(&str, &Checksum)> {
  dependency.configuration.as_deref().map(Configuration::sort_key)
}
