//! Implementation of the `trellis info` command.
//!
//! Summarizes a workspace file: its checksum, what it declares, and the
//! order its targets depend on each other.

use std::path::Path;

use anyhow::Result;

use trellis_lib::workspace::TargetGraph;

use super::load_workspace;
use crate::output::{OutputFormat, Status, print_json, print_stat, print_status, short};

pub fn cmd_info(file: &Path, format: OutputFormat) -> Result<()> {
  let workspace = load_workspace(file)?;
  let order = TargetGraph::new(workspace.targets())
    .order()
    .map_err(|label| anyhow::anyhow!("attribute cycle through {}", label))?;
  let definition = workspace.file();

  if format.is_json() {
    let json_output = serde_json::json!({
      "checksum": workspace.checksum(),
      "packages": definition.packages.len(),
      "targets": order,
      "transitions": definition.transitions.keys().collect::<Vec<_>>(),
      "aspects": workspace.aspects().keys().collect::<Vec<_>>(),
      "top_level": definition.top_level.iter().map(|top| &top.label).collect::<Vec<_>>(),
      "deferred": definition.deferred,
      "settings": definition.settings,
    });
    return print_json(&json_output);
  }

  print_status(Status::Ok, &format!("Workspace {}", short(workspace.checksum())));
  print_stat("Packages", definition.packages.len());
  print_stat("Targets", order.len());
  print_stat("Transitions", definition.transitions.len());
  print_stat("Aspects", workspace.aspects().len());
  print_stat("Top-level", definition.top_level.len());
  print_stat("Max restarts", definition.settings.max_restarts);
  if definition.deferred {
    print_stat("Mode", "deferred");
  }

  if !order.is_empty() {
    println!();
    println!("Targets (dependencies first):");
    for label in &order {
      print_status(Status::Note, &label.to_string());
    }
  }
  Ok(())
}
