//! Platform mappings: translate between platform labels and legacy options.
//!
//! A mapping file is JSON with two sections:
//!
//! ```json
//! {
//!   "platforms": { "//platforms:arm": { "cpu": "arm" } },
//!   "flags": [ { "options": { "cpu": "arm" }, "platform": "//platforms:arm" } ]
//! }
//! ```
//!
//! - `platforms`: when the `platforms` option names a mapped platform, its
//!   overrides are laid over the options
//! - `flags`: otherwise, the first entry whose options are all present sets
//!   the `platforms` option

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::configuration::ConfigurationKey;
use super::options::{BuildOptions, OptionValue};
use super::types::ConfigurationError;
use crate::consts::PLATFORMS_OPTION;
use crate::label::Label;

/// One entry of the `flags` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagMapping {
  pub options: BuildOptions,
  pub platform: Label,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformMapping {
  #[serde(default)]
  pub platforms: BTreeMap<Label, BuildOptions>,
  #[serde(default)]
  pub flags: Vec<FlagMapping>,
}

impl PlatformMapping {
  /// Parse mapping text read from `path`. Empty text is an empty mapping.
  pub fn parse(path: &str, text: &str) -> Result<Self, ConfigurationError> {
    if text.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_json::from_str(text).map_err(|e| ConfigurationError::PlatformMapping {
      path: path.to_string(),
      message: e.to_string(),
    })
  }

  /// Apply the mapping to `options` and derive the configuration key.
  pub fn map(&self, options: &BuildOptions) -> Result<ConfigurationKey, ConfigurationError> {
    if let Some(platform) = self.current_platform(options)? {
      if let Some(overrides) = self.platforms.get(&platform) {
        return Ok(ConfigurationKey::new(options.overlay(overrides)));
      }
      return Ok(ConfigurationKey::new(options.clone()));
    }

    let matched = self.flags.iter().find(|entry| options.contains_all(&entry.options));
    match matched {
      Some(entry) => {
        let mut mapped = options.clone();
        mapped.set(PLATFORMS_OPTION, entry.platform.to_string());
        Ok(ConfigurationKey::new(mapped))
      }
      None => Ok(ConfigurationKey::new(options.clone())),
    }
  }

  fn current_platform(&self, options: &BuildOptions) -> Result<Option<Label>, ConfigurationError> {
    let text = match options.get(PLATFORMS_OPTION) {
      None => return Ok(None),
      Some(OptionValue::Str(text)) => text.as_str(),
      Some(OptionValue::List(items)) if items.len() == 1 => items[0].as_str(),
      Some(other) => {
        return Err(ConfigurationError::InvalidOption {
          name: PLATFORMS_OPTION.to_string(),
          reason: format!("expected one platform label, got '{other}'"),
        });
      }
    };
    Label::parse(text).map(Some).map_err(|e| ConfigurationError::InvalidOption {
      name: PLATFORMS_OPTION.to_string(),
      reason: e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MAPPING: &str = r#"{
    "platforms": { "//platforms:arm": { "cpu": "arm" } },
    "flags": [
      { "options": { "cpu": "ppc" }, "platform": "//platforms:ppc" },
      { "options": { "cpu": "ppc", "os": "aix" }, "platform": "//platforms:aix" }
    ]
  }"#;

  #[test]
  fn platform_overrides_are_applied() {
    let mapping = PlatformMapping::parse("pm", MAPPING).unwrap();
    let key = mapping
      .map(&BuildOptions::new().with("platforms", "//platforms:arm").with("cpu", "k8"))
      .unwrap();
    assert_eq!(key.options().get_str("cpu"), Some("arm"));
  }

  #[test]
  fn first_matching_flag_entry_sets_platform() {
    let mapping = PlatformMapping::parse("pm", MAPPING).unwrap();
    let key = mapping.map(&BuildOptions::new().with("cpu", "ppc").with("os", "aix")).unwrap();
    assert_eq!(key.options().get_str("platforms"), Some("//platforms:ppc"));
  }

  #[test]
  fn unmapped_options_pass_through() {
    let mapping = PlatformMapping::parse("pm", MAPPING).unwrap();
    let options = BuildOptions::new().with("cpu", "k8");
    let key = mapping.map(&options).unwrap();
    assert_eq!(key.options(), &options);
    assert_eq!(key.checksum(), &options.checksum());
  }

  #[test]
  fn empty_text_is_empty_mapping() {
    assert_eq!(PlatformMapping::parse("pm", "  \n").unwrap(), PlatformMapping::default());
  }

  #[test]
  fn parse_failure_is_typed() {
    let err = PlatformMapping::parse("conf/pm", "{ not json").unwrap_err();
    assert!(matches!(err, ConfigurationError::PlatformMapping { ref path, .. } if path == "conf/pm"));

    let err = PlatformMapping::parse("pm", r#"{"unknown": 1}"#).unwrap_err();
    assert!(matches!(err, ConfigurationError::PlatformMapping { .. }));
  }

  #[test]
  fn malformed_platform_option_is_rejected() {
    let mapping = PlatformMapping::default();
    let err = mapping.map(&BuildOptions::new().with("platforms", true)).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
  }
}
