//! Implementation of the `trellis build` command.
//!
//! Loads a workspace, drives every top-level key through analysis and
//! execution until the stores settle, and prints one line per key.
//! Exits non-zero when any key failed.

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};

use trellis_lib::event::{EventSink, RecordingSink, TracingSink};
use trellis_lib::session::{BuildReport, TargetReport, TargetStatus};

use super::load_workspace;
use crate::output::{OutputFormat, Status, format_duration, print_detail, print_json, print_stat, print_status, short};

pub fn cmd_build(file: &Path, format: OutputFormat, verbose: bool) -> Result<()> {
  let start = Instant::now();
  let workspace = load_workspace(file)?;
  let stores = workspace.stores()?;
  let session = workspace.session(&stores)?;
  let requests = workspace.requests(&session);

  let recorded = RecordingSink::new();
  let events: &dyn EventSink = if format.is_json() { &recorded } else { &TracingSink };
  let report = session.build(&requests, events);

  if format.is_json() {
    let json_output = serde_json::json!({
      "workspace": workspace.checksum(),
      "report": report,
      "events": recorded.events(),
    });
    print_json(&json_output)?;
  } else {
    print_report(&report, verbose);
    println!();
    print_stat("Workspace", short(workspace.checksum()));
    print_stat("Built", report.count(TargetStatus::Built));
    print_stat("Skipped", report.count(TargetStatus::Skipped));
    print_stat("Failed", report.count(TargetStatus::Failed));
    print_stat("Restarts", report.restarts);
    print_stat("Time", format_duration(start.elapsed()));
  }

  if !report.success() {
    bail!(
      "{} of {} top-level key(s) failed",
      report.count(TargetStatus::Failed),
      report.targets.len()
    );
  }
  Ok(())
}

fn print_report(report: &BuildReport, verbose: bool) {
  for target in &report.targets {
    print_target(target);
  }
  if verbose && !report.executed.is_empty() {
    println!();
    println!("Executed:");
    for key in &report.executed {
      print_status(Status::Note, &key.to_string());
    }
  }
}

fn print_target(target: &TargetReport) {
  let mut line = target.key.to_string();
  if let Some(test_type) = target.test_type {
    line.push_str(&format!(" ({} test)", test_type));
  }
  let status = match target.status {
    TargetStatus::Built => Status::Ok,
    TargetStatus::Skipped => Status::Skipped,
    TargetStatus::Failed => Status::Failed,
  };
  print_status(status, &line);
  if let Some(message) = &target.message {
    print_detail(message);
  }
  if target.transient {
    print_detail("may succeed in a later build");
  }
  for cause in &target.root_causes {
    print_detail(&format!("root cause: {}", cause));
  }
}
