//! Implementation of the `trellis analyze` command.

use std::path::Path;

use anyhow::{Context, Result};

use trellis_lib::label::Label;

use super::load_workspace;
use crate::output::{OutputFormat, Status, print_detail, print_item, print_json, print_stat, print_status};

pub fn cmd_analyze(file: &Path, label: &str, aspect: Option<&str>, format: OutputFormat) -> Result<()> {
  let workspace = load_workspace(file)?;
  let label = Label::parse(label).with_context(|| format!("Invalid label: {}", label))?;
  let stores = workspace.stores()?;
  let session = workspace.session(&stores)?;

  let key = match aspect {
    Some(aspect) => session.aspect_key(aspect, label),
    None => session.target_key(label),
  };
  let settled = session
    .analyze(&key)
    .with_context(|| format!("Failed to analyze {}", key))?;
  let value = &settled.value;
  let providers: Vec<String> = value.node.providers.ids().map(ToString::to_string).collect();

  if format.is_json() {
    let json_output = serde_json::json!({
      "key": value.key,
      "artifacts": value.artifacts,
      "actions": value.actions,
      "providers": providers,
      "aspects": value.node.aspects,
      "restarts": settled.restarts,
    });
    return print_json(&json_output);
  }

  print_status(Status::Ok, &format!("Analyzed {}", key));
  print_stat("Artifacts", value.artifacts.len());
  for artifact in &value.artifacts {
    print_item(artifact);
  }
  print_stat("Actions", value.actions.len());
  for action in &value.actions {
    let outputs: Vec<String> = action.outputs.iter().map(ToString::to_string).collect();
    print_detail(&format!("{} {}", action.mnemonic, outputs.join(", ")));
  }
  if !providers.is_empty() {
    print_stat("Providers", providers.join(", "));
  }
  if let Some(reason) = &value.incompatible {
    print_stat("Incompatible", reason);
  }
  Ok(())
}
