//! Aspects evaluated from their declarations.

use std::collections::BTreeMap;

use dashmap::DashMap;

use super::lazy::LazyTable;
use crate::aspect::{Aspect, AspectError, AspectKey, AspectValue};
use crate::env::AspectApplier;
use crate::eval::Lookup;
use crate::node::ConfiguredNode;

type Applied = Result<AspectValue, AspectError>;

/// Applies an aspect by attaching the providers it declares.
pub struct DeclaredAspects {
  table: LazyTable<AspectKey, Applied>,
  requested: DashMap<AspectKey, Aspect>,
  failures: BTreeMap<String, String>,
}

impl DeclaredAspects {
  pub fn new(deferred: bool) -> Self {
    Self {
      table: LazyTable::new(deferred),
      requested: DashMap::new(),
      failures: BTreeMap::new(),
    }
  }

  /// Make every application of `aspect` fail.
  pub fn fail(&mut self, aspect: impl Into<String>, message: impl Into<String>) {
    self.failures.insert(aspect.into(), message.into());
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|key| {
      let aspect = self.requested.get(key).map(|entry| entry.value().clone());
      match aspect {
        Some(aspect) => self.compute(key, &aspect),
        None => Err(AspectError::Failed {
          aspect: key.aspect.clone(),
          target: key.target.label.clone(),
          message: "requested without a declaration".to_string(),
        }),
      }
    })
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn compute(&self, key: &AspectKey, aspect: &Aspect) -> Applied {
    if let Some(message) = self.failures.get(&aspect.name) {
      return Err(AspectError::Failed {
        aspect: aspect.name.clone(),
        target: key.target.label.clone(),
        message: message.clone(),
      });
    }
    Ok(AspectValue {
      key: key.clone(),
      providers: aspect.provides.iter().map(|(id, value)| (id.clone(), value.clone())).collect(),
    })
  }
}

impl AspectApplier for DeclaredAspects {
  fn apply(&self, aspect: &Aspect, node: &ConfiguredNode) -> Lookup<Applied> {
    let key = AspectKey {
      aspect: aspect.name.clone(),
      target: node.key.clone(),
    };
    if self.table.is_deferred() {
      self.requested.entry(key.clone()).or_insert_with(|| aspect.clone());
    }
    self.table.get(&key, |key| self.compute(key, aspect))
  }
}
