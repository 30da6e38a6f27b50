mod analyze;
mod build;
mod info;
mod resolve;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use trellis_lib::workspace::Workspace;

pub use analyze::cmd_analyze;
pub use build::cmd_build;
pub use info::cmd_info;
pub use resolve::cmd_resolve;

fn load_workspace(file: &Path) -> Result<Workspace> {
  debug!(path = %file.display(), "loading workspace");
  Workspace::load(file).with_context(|| format!("Failed to load workspace: {}", file.display()))
}
