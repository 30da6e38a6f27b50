//! Configured targets built straight from their definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::lazy::LazyTable;
use crate::config::Configuration;
use crate::env::ConfiguredTargetStore;
use crate::eval::Lookup;
use crate::label::Label;
use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};
use crate::target::{RootCause, Target};

type Built = Result<Arc<ConfiguredNode>, AnalysisFailure>;
type Inputs = (Arc<Target>, Option<Arc<Configuration>>);

/// Produces a [`ConfiguredNode`] per key from the target definition.
///
/// Deferred requests keep their inputs so [`StaticConfiguredTargets::settle`]
/// can build them later.
pub struct StaticConfiguredTargets {
  table: LazyTable<ConfiguredTargetKey, Built>,
  inputs: DashMap<ConfiguredTargetKey, Inputs>,
  failures: BTreeMap<Label, String>,
}

impl StaticConfiguredTargets {
  pub fn new(deferred: bool) -> Self {
    Self {
      table: LazyTable::new(deferred),
      inputs: DashMap::new(),
      failures: BTreeMap::new(),
    }
  }

  /// Make analysis of `label` fail in every configuration.
  pub fn fail(&mut self, label: Label, message: impl Into<String>) {
    self.failures.insert(label, message.into());
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.len() == 0
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|key| {
      let recorded = self.inputs.get(key).map(|entry| entry.value().clone());
      match recorded {
        Some((target, configuration)) => self.build(key, target, configuration),
        None => Err(AnalysisFailure {
          label: key.label.clone(),
          message: "requested without a target definition".to_string(),
          root_causes: Vec::new(),
        }),
      }
    })
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn build(&self, key: &ConfiguredTargetKey, target: Arc<Target>, configuration: Option<Arc<Configuration>>) -> Built {
    if let Some(message) = self.failures.get(&key.label) {
      return Err(AnalysisFailure {
        label: key.label.clone(),
        message: message.clone(),
        root_causes: vec![RootCause::Analysis {
          label: key.label.clone(),
          message: message.clone(),
        }],
      });
    }
    trace!(target = %key, "configuring target");
    Ok(Arc::new(ConfiguredNode::new(key.clone(), target, configuration)))
  }
}

impl ConfiguredTargetStore for StaticConfiguredTargets {
  fn configured_target(
    &self,
    key: &ConfiguredTargetKey,
    target: &Arc<Target>,
    configuration: Option<&Arc<Configuration>>,
  ) -> Lookup<Built> {
    if self.table.is_deferred() {
      self
        .inputs
        .entry(key.clone())
        .or_insert_with(|| (Arc::clone(target), configuration.cloned()));
    }
    self
      .table
      .get(key, |key| self.build(key, Arc::clone(target), configuration.cloned()))
  }
}
