//! Build configurations and their resolution.
//!
//! - [`BuildOptions`]: the raw option set a configuration is built from
//! - [`Configuration`]: immutable, content-addressed configuration
//! - [`PlatformMapping`]: platform label / option translation
//! - [`ConfigurationResolver`]: dependency edge to configured dependencies

pub mod configuration;
pub mod options;
pub mod platform_mapping;
pub mod resolver;
pub mod types;

pub use configuration::{Configuration, ConfigurationKey};
pub use options::{BuildOptions, OptionValue};
pub use platform_mapping::{FlagMapping, PlatformMapping};
pub use resolver::ConfigurationResolver;
pub use types::{ConfigurationCreationError, ConfigurationError, CreationReason};
