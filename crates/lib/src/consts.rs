//! Well-known option names and keys shared across the crate.

/// Transition key attached to the single output of a patch transition.
pub const PATCH_TRANSITION_KEY: &str = "";

/// Number of checksum characters shown in logs and display strings.
pub const CHECKSUM_PREFIX_LEN: usize = 12;

/// Target CPU option.
pub const CPU_OPTION: &str = "cpu";

/// Compilation mode option (`fastbuild`, `dbg` or `opt`).
pub const COMPILATION_MODE_OPTION: &str = "compilation_mode";

/// Target platform option. Holds one platform label.
pub const PLATFORMS_OPTION: &str = "platforms";

/// Set on configurations that build tools for the execution platform.
pub const IS_EXEC_OPTION: &str = "is_exec";

pub const DEFAULT_CPU: &str = "k8";
pub const DEFAULT_COMPILATION_MODE: &str = "fastbuild";

/// Accepted values for [`COMPILATION_MODE_OPTION`].
pub const COMPILATION_MODES: &[&str] = &["fastbuild", "dbg", "opt"];

/// Default location of the platform mapping file.
pub const DEFAULT_PLATFORM_MAPPINGS: &str = "platform_mappings";

/// Tag marking a test that must run alone.
pub const EXCLUSIVE_TAG: &str = "exclusive";

/// Tag marking a test that must run alone when executed locally.
pub const EXCLUSIVE_IF_LOCAL_TAG: &str = "exclusive-if-local";

/// Rule classes ending with this suffix are tests.
pub const TEST_RULE_SUFFIX: &str = "_test";

/// Attribute whose labels are visibility edges.
pub const VISIBILITY_ATTRIBUTE: &str = "visibility";

/// Output root for artifacts of configuration-less targets.
pub const SOURCE_ROOT: &str = "src";
