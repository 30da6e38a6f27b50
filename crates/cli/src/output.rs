//! Terminal and JSON output for the `trellis` commands.
//!
//! Status lines carry a coloured marker; colour is dropped when the stream
//! is not a terminal. JSON goes to stdout, pretty-printed.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use trellis_lib::consts::CHECKSUM_PREFIX_LEN;
use trellis_lib::util::hash::Checksum;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub const ARROW: &str = "→";

/// Marker in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Ok,
  Skipped,
  Failed,
  Note,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Ok => "✓",
      Status::Skipped => "-",
      Status::Failed => "✗",
      Status::Note => "•",
    }
  }
}

/// Print `message` on stdout behind the marker for `status`.
///
/// Failed lines are red as a whole.
pub fn print_status(status: Status, message: &str) {
  let marker = status.marker();
  let marker = match status {
    Status::Ok => marker.if_supports_color(Stream::Stdout, |m| m.green()).to_string(),
    Status::Skipped => marker.if_supports_color(Stream::Stdout, |m| m.yellow()).to_string(),
    Status::Failed => marker.if_supports_color(Stream::Stdout, |m| m.red()).to_string(),
    Status::Note => marker.if_supports_color(Stream::Stdout, |m| m.blue()).to_string(),
  };
  if status == Status::Failed {
    println!("{marker} {}", message.if_supports_color(Stream::Stdout, |m| m.red()));
  } else {
    println!("{marker} {message}");
  }
}

/// Top-level command failure, on stderr.
pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    Status::Failed.marker().if_supports_color(Stream::Stderr, |m| m.red()),
    message.if_supports_color(Stream::Stderr, |m| m.red())
  );
}

/// `  name: value` summary line.
pub fn print_stat(name: &str, value: impl std::fmt::Display) {
  println!("  {}: {value}", name.if_supports_color(Stream::Stdout, |n| n.dimmed()));
}

/// An indented detail line under a status line.
pub fn print_detail(message: &str) {
  println!("    {}", message.if_supports_color(Stream::Stdout, |m| m.dimmed()));
}

/// `  → item` list entry.
pub fn print_item(item: impl std::fmt::Display) {
  println!("  {ARROW} {item}");
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

/// The checksum prefix shown to users.
pub fn short(checksum: &Checksum) -> &str {
  let hex = checksum.0.as_str();
  hex.get(..CHECKSUM_PREFIX_LEN).unwrap_or(hex)
}

pub fn format_duration(duration: Duration) -> String {
  let millis = duration.as_millis();
  match millis {
    0..=999 => format!("{millis}ms"),
    1_000..=59_999 => format!("{:.2}s", duration.as_secs_f64()),
    _ => {
      let secs = duration.as_secs();
      format!("{}m {}s", secs / 60, secs % 60)
    }
  }
}
