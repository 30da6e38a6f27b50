//! Platform mapping files held in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::lazy::LazyTable;
use crate::config::{ConfigurationError, PlatformMapping};
use crate::consts::DEFAULT_PLATFORM_MAPPINGS;
use crate::env::PlatformMappingStore;
use crate::eval::Lookup;

type Parsed = Result<Arc<PlatformMapping>, ConfigurationError>;

/// Mapping file contents by path.
///
/// A missing file at the default path is an empty mapping. A missing file
/// anywhere else was asked for explicitly and is an error.
pub struct MemoryPlatformMappings {
  files: BTreeMap<String, String>,
  table: LazyTable<String, Parsed>,
}

impl MemoryPlatformMappings {
  pub fn new(deferred: bool) -> Self {
    Self {
      files: BTreeMap::new(),
      table: LazyTable::new(deferred),
    }
  }

  pub fn add(&mut self, path: impl Into<String>, text: impl Into<String>) {
    self.files.insert(path.into(), text.into());
  }

  pub(crate) fn settle(&self) -> usize {
    self.table.settle(|path| self.parse(path))
  }

  pub(crate) fn pending(&self) -> usize {
    self.table.pending()
  }

  fn parse(&self, path: &String) -> Parsed {
    match self.files.get(path) {
      Some(text) => PlatformMapping::parse(path, text).map(Arc::new),
      None if path == DEFAULT_PLATFORM_MAPPINGS => Ok(Arc::new(PlatformMapping::default())),
      None => Err(ConfigurationError::MissingPlatformMapping { path: path.clone() }),
    }
  }
}

impl PlatformMappingStore for MemoryPlatformMappings {
  fn mapping(&self, path: &str) -> Lookup<Parsed> {
    self.table.get(&path.to_string(), |path| self.parse(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_path_may_be_absent() {
    let mappings = MemoryPlatformMappings::new(false);
    let Lookup::Ready(Ok(mapping)) = mappings.mapping(DEFAULT_PLATFORM_MAPPINGS) else {
      panic!("expected empty mapping");
    };
    assert_eq!(*mapping, PlatformMapping::default());
  }

  #[test]
  fn explicit_path_must_exist() {
    let mappings = MemoryPlatformMappings::new(false);
    assert!(matches!(
      mappings.mapping("conf/mappings.json"),
      Lookup::Ready(Err(ConfigurationError::MissingPlatformMapping { .. }))
    ));
  }

  #[test]
  fn registered_text_is_parsed_once_settled() {
    let mut mappings = MemoryPlatformMappings::new(true);
    mappings.add("pm", r#"{"platforms": {"//platforms:arm": {"cpu": "arm"}}}"#);
    assert!(mappings.mapping("pm").is_pending());
    assert_eq!(mappings.settle(), 1);
    let Lookup::Ready(Ok(mapping)) = mappings.mapping("pm") else {
      panic!("expected mapping");
    };
    assert_eq!(mapping.platforms.len(), 1);
  }
}
