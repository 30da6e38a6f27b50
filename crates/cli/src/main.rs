mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// trellis - configured target graph resolution over workspace files
#[derive(Parser)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Summarize a workspace file
  Info {
    /// Path to the workspace file
    file: PathBuf,
  },

  /// Resolve one attribute of a target in the top-level configuration
  Resolve {
    /// Path to the workspace file
    file: PathBuf,
    /// Target label, e.g. //app:main
    label: String,
    /// Attribute name, e.g. deps
    attribute: String,
  },

  /// Analyze a target and list its artifacts and actions
  Analyze {
    /// Path to the workspace file
    file: PathBuf,
    /// Target label, e.g. //app:main
    label: String,
    /// Analyze this aspect on top of the target
    #[arg(long)]
    aspect: Option<String>,
  },

  /// Build every top-level target of a workspace
  Build {
    /// Path to the workspace file
    file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Info { file } => cmd::cmd_info(&file, cli.output),
    Commands::Resolve { file, label, attribute } => cmd::cmd_resolve(&file, &label, &attribute, cli.output),
    Commands::Analyze { file, label, aspect } => cmd::cmd_analyze(&file, &label, aspect.as_deref(), cli.output),
    Commands::Build { file } => cmd::cmd_build(&file, cli.output, cli.verbose),
  };

  if let Err(e) = &result {
    output::print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
  Ok(())
}
