//! Implementation of the `trellis resolve` command.
//!
//! Resolves one attribute of a target in the workspace's top-level
//! configuration and prints the configured dependencies.

use std::path::Path;

use anyhow::{Context, Result};

use trellis_lib::label::Label;

use super::load_workspace;
use crate::output::{OutputFormat, Status, print_detail, print_item, print_json, print_status, short};

pub fn cmd_resolve(file: &Path, label: &str, attribute: &str, format: OutputFormat) -> Result<()> {
  let workspace = load_workspace(file)?;
  let label = Label::parse(label).with_context(|| format!("Invalid label: {}", label))?;
  let stores = workspace.stores()?;
  let session = workspace.session(&stores)?;

  let settled = session
    .resolve(&label, attribute)
    .with_context(|| format!("Failed to resolve {} of {}", attribute, label))?;
  let resolution = settled.value;

  if format.is_json() {
    let json_output = serde_json::json!({
      "resolution": resolution,
      "restarts": settled.restarts,
    });
    return print_json(&json_output);
  }

  print_status(
    Status::Ok,
    &format!(
      "{} {}: {} dependency edge(s)",
      resolution.target,
      resolution.attribute,
      resolution.dependencies.len()
    ),
  );
  for edge in &resolution.dependencies {
    let configuration = match (&edge.mnemonic, &edge.configuration) {
      (Some(mnemonic), Some(checksum)) => format!("{} ({})", mnemonic, short(checksum)),
      _ => "no configuration".to_string(),
    };
    let keys = if edge.transition_keys.is_empty() {
      String::new()
    } else {
      format!(" [{}]", edge.transition_keys.join(", "))
    };
    print_item(format!("{} {}{}", edge.label, configuration, keys));
  }
  for cause in &resolution.root_causes {
    print_detail(&cause.to_string());
  }
  if settled.restarts > 0 {
    print_detail(&format!("settled after {} restart(s)", settled.restarts));
  }
  Ok(())
}
