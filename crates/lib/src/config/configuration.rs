//! Immutable, content-addressed configurations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::options::{BuildOptions, OptionValue};
use super::types::ConfigurationError;
use crate::consts::{
  COMPILATION_MODE_OPTION, COMPILATION_MODES, CPU_OPTION, DEFAULT_COMPILATION_MODE, DEFAULT_CPU, IS_EXEC_OPTION,
  PLATFORMS_OPTION,
};
use crate::label::Label;
use crate::util::hash::Checksum;

/// The options a configuration is created from, after platform mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationKey {
  options: BuildOptions,
  checksum: Checksum,
}

impl ConfigurationKey {
  pub fn new(options: BuildOptions) -> Self {
    let checksum = options.checksum();
    Self { options, checksum }
  }

  pub fn options(&self) -> &BuildOptions {
    &self.options
  }

  pub fn checksum(&self) -> &Checksum {
    &self.checksum
  }
}

/// An immutable build configuration.
///
/// Created once per [`ConfigurationKey`] and shared behind an `Arc` for the
/// rest of the evaluation. The checksum of a configuration equals the
/// checksum of its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
  options: BuildOptions,
  checksum: Checksum,
  mnemonic: String,
  fragments: BTreeMap<String, String>,
  is_tool: bool,
  platform: Option<Label>,
}

impl Configuration {
  /// Validate the key's options and derive fragments and mnemonic.
  pub fn create(key: &ConfigurationKey) -> Result<Self, ConfigurationError> {
    let options = key.options();

    let cpu = match options.get(CPU_OPTION) {
      None => DEFAULT_CPU.to_string(),
      Some(OptionValue::Str(cpu)) if !cpu.is_empty() => cpu.clone(),
      Some(other) => return Err(invalid(CPU_OPTION, format!("expected a non-empty string, got '{other}'"))),
    };

    let mode = match options.get(COMPILATION_MODE_OPTION) {
      None => DEFAULT_COMPILATION_MODE.to_string(),
      Some(OptionValue::Str(mode)) if COMPILATION_MODES.contains(&mode.as_str()) => mode.clone(),
      Some(other) => {
        return Err(invalid(
          COMPILATION_MODE_OPTION,
          format!("expected one of {}, got '{other}'", COMPILATION_MODES.join(", ")),
        ));
      }
    };

    let is_tool = match options.get(IS_EXEC_OPTION) {
      None => false,
      Some(OptionValue::Bool(b)) => *b,
      Some(other) => return Err(invalid(IS_EXEC_OPTION, format!("expected a bool, got '{other}'"))),
    };

    let platform = match options.get(PLATFORMS_OPTION) {
      None => None,
      Some(OptionValue::Str(text)) => {
        Some(Label::parse(text).map_err(|e| invalid(PLATFORMS_OPTION, e.to_string()))?)
      }
      Some(OptionValue::List(items)) if items.len() == 1 => {
        Some(Label::parse(&items[0]).map_err(|e| invalid(PLATFORMS_OPTION, e.to_string()))?)
      }
      Some(other) => return Err(invalid(PLATFORMS_OPTION, format!("expected one platform label, got '{other}'"))),
    };

    let mut mnemonic = format!("{cpu}-{mode}");
    if is_tool {
      mnemonic.push_str("-exec");
    }

    let mut fragments = BTreeMap::new();
    fragments.insert(CPU_OPTION.to_string(), cpu);
    fragments.insert(COMPILATION_MODE_OPTION.to_string(), mode);
    if let Some(platform) = &platform {
      fragments.insert("platform".to_string(), platform.to_string());
    }

    Ok(Self {
      options: options.clone(),
      checksum: key.checksum().clone(),
      mnemonic,
      fragments,
      is_tool,
      platform,
    })
  }

  pub fn options(&self) -> &BuildOptions {
    &self.options
  }

  pub fn checksum(&self) -> &Checksum {
    &self.checksum
  }

  /// Short human-readable name, e.g. `k8-fastbuild`.
  pub fn mnemonic(&self) -> &str {
    &self.mnemonic
  }

  pub fn fragment(&self, name: &str) -> Option<&str> {
    self.fragments.get(name).map(String::as_str)
  }

  /// Whether this configuration builds tools for the execution platform.
  pub fn is_tool(&self) -> bool {
    self.is_tool
  }

  pub fn platform(&self) -> Option<&Label> {
    self.platform.as_ref()
  }

  /// Deterministic ordering key for split outputs.
  pub fn sort_key(&self) -> (&str, &Checksum) {
    (&self.mnemonic, &self.checksum)
  }

  /// `mnemonic-shortchecksum`, unique enough for logs and output paths.
  pub fn short_id(&self) -> String {
    format!("{}-{}", self.mnemonic, self.checksum.short())
  }
}

impl fmt::Display for Configuration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short_id())
  }
}

fn invalid(name: &str, reason: String) -> ConfigurationError {
  ConfigurationError::InvalidOption {
    name: name.to_string(),
    reason,
  }
}
