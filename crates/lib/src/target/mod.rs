//! Targets, packages and the fetcher that connects labels to them.

pub mod cause;
pub mod fetch;
pub mod types;

pub use cause::{LoadingFailureKind, RootCause, RootCauseHook};
pub use fetch::{TargetFetcher, loading_cause};
pub use types::{ActionTemplate, Package, PackageLoadError, Target, TargetKind};
