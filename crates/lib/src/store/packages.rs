//! Packages held in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use super::lazy::LazyTable;
use crate::env::PackageStore;
use crate::eval::Lookup;
use crate::label::PackageId;
use crate::target::{Package, PackageLoadError, Target};

type Loaded = Result<Arc<Package>, PackageLoadError>;

/// Package definitions registered up front.
///
/// A package of the main repository that was never registered is
/// `NoSuchPackage`. A package of an external repository no registered
/// package belongs to is a repository fetch failure.
pub struct MemoryPackageStore {
  packages: BTreeMap<PackageId, Package>,
  failures: BTreeMap<PackageId, PackageLoadError>,
  table: LazyTable<PackageId, Loaded>,
}

impl MemoryPackageStore {
  pub fn new(deferred: bool) -> Self {
    Self {
      packages: BTreeMap::new(),
      failures: BTreeMap::new(),
      table: LazyTable::new(deferred),
    }
  }

  /// Register `target` in its owning package.
  pub fn add_target(&mut self, target: Target) {
    let id = target.label.package_id();
    self.packages.entry(id.clone()).or_insert_with(|| Package::new(id)).add(target);
  }

  /// Make loading `id` fail with `error`.
  pub fn fail(&mut self, id: PackageId, error: PackageLoadError) {
    self.failures.insert(id, error);
  }

  pub fn package_count(&self) -> usize {
    self.packages.len()
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|id| self.load(id))
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn load(&self, id: &PackageId) -> Loaded {
    trace!(package = %id, "loading package");
    if let Some(error) = self.failures.get(id) {
      return Err(error.clone());
    }
    if let Some(package) = self.packages.get(id) {
      return Ok(Arc::new(package.clone()));
    }
    if !id.is_main_repo() && !self.packages.keys().any(|known| known.repo == id.repo) {
      return Err(PackageLoadError::RepositoryFetch {
        repo: id.repo.clone(),
        message: "repository is not defined in the workspace".to_string(),
      });
    }
    Err(PackageLoadError::NoSuchPackage {
      package: id.clone(),
      message: "BUILD file not found".to_string(),
    })
  }
}

impl PackageStore for MemoryPackageStore {
  fn package(&self, id: &PackageId) -> Lookup<Loaded> {
    self.table.get(id, |id| self.load(id))
  }
}
