use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// berth - single-host container reconciler
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Reconcile the host to the declared deployment
  Apply {
    /// Path to the deployment file (default: deploy.json)
    #[arg(default_value = "deploy.json")]
    config: PathBuf,

    /// Path to the persisted plan (default: <config stem>.plan.json)
    #[arg(long)]
    plan_file: Option<PathBuf>,
  },

  /// Show the steps a reconciliation would run (dry-run)
  Plan {
    /// Path to the deployment file (default: deploy.json)
    #[arg(default_value = "deploy.json")]
    config: PathBuf,

    /// Path to the persisted plan (default: <config stem>.plan.json)
    #[arg(long)]
    plan_file: Option<PathBuf>,
  },

  /// Show observed status and drift for every declared container
  Status {
    /// Path to the deployment file (default: deploy.json)
    #[arg(default_value = "deploy.json")]
    config: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt().with_env_filter(filter).without_time().init();

  match cli.command {
    Commands::Apply { config, plan_file } => cmd::cmd_apply(&config, plan_file.as_deref()),
    Commands::Plan { config, plan_file } => cmd::cmd_plan(&config, plan_file.as_deref()),
    Commands::Status { config } => cmd::cmd_status(&config),
  }
}
