//! Configuration interning.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::lazy::LazyTable;
use crate::config::{BuildOptions, Configuration, ConfigurationError, ConfigurationKey};
use crate::env::ConfigurationCache;
use crate::eval::Lookup;
use crate::util::hash::Checksum;

type Created = Result<Arc<Configuration>, ConfigurationError>;

/// One [`Configuration`] per key for the lifetime of the store.
///
/// Equal keys always yield the same `Arc`, so identity comparisons between
/// configurations are meaningful.
pub struct InternedConfigurations {
  table: LazyTable<ConfigurationKey, Created>,
  by_checksum: DashMap<Checksum, Arc<Configuration>>,
}

impl InternedConfigurations {
  pub fn new(deferred: bool) -> Self {
    Self {
      table: LazyTable::new(deferred),
      by_checksum: DashMap::new(),
    }
  }

  /// Create (or reuse) the configuration for `options` right away,
  /// bypassing platform mapping. Used for top-level configurations.
  pub fn intern(&self, options: BuildOptions) -> Created {
    let key = ConfigurationKey::new(options);
    self.table.get_or_compute(&key, |key| self.create(key))
  }

  pub fn get(&self, checksum: &Checksum) -> Option<Arc<Configuration>> {
    self.by_checksum.get(checksum).map(|entry| Arc::clone(entry.value()))
  }

  /// Number of configurations created so far.
  pub fn len(&self) -> usize {
    self.by_checksum.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_checksum.is_empty()
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|key| self.create(key))
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn create(&self, key: &ConfigurationKey) -> Created {
    let configuration = Arc::new(Configuration::create(key)?);
    debug!(
      configuration = %configuration.mnemonic(),
      checksum = %configuration.checksum().short(),
      "created configuration"
    );
    self
      .by_checksum
      .insert(configuration.checksum().clone(), Arc::clone(&configuration));
    Ok(configuration)
  }
}

impl ConfigurationCache for InternedConfigurations {
  fn configuration(&self, key: &ConfigurationKey) -> Lookup<Created> {
    self.table.get(key, |key| self.create(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn equal_options_share_one_configuration() {
    let configurations = InternedConfigurations::new(false);
    let first = configurations.intern(BuildOptions::new().with("cpu", "arm")).unwrap();
    let second = configurations.intern(BuildOptions::new().with("cpu", "arm")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(configurations.len(), 1);

    let Lookup::Ready(Ok(third)) = configurations.configuration(&ConfigurationKey::new(BuildOptions::new().with("cpu", "arm")))
    else {
      panic!("expected configuration");
    };
    assert!(Arc::ptr_eq(&first, &third));
    assert!(configurations.get(first.checksum()).is_some());
  }

  #[test]
  fn invalid_options_are_not_interned() {
    let configurations = InternedConfigurations::new(false);
    let err = configurations
      .intern(BuildOptions::new().with("compilation_mode", "turbo"))
      .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
    assert!(configurations.is_empty());
  }

  #[test]
  fn deferred_requests_are_created_on_settle() {
    let configurations = InternedConfigurations::new(true);
    let key = ConfigurationKey::new(BuildOptions::new());
    assert!(configurations.configuration(&key).is_pending());
    assert_eq!(configurations.pending(), 1);
    configurations.settle();
    assert!(matches!(configurations.configuration(&key), Lookup::Ready(Ok(_))));
  }
}
