use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "subunit-pusher")]
#[command(about = "Push subunit streams from CI log events into storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Gearman worker until interrupted
    Run(RunArgs),
    /// Load and validate configuration, then exit
    CheckConfig(CheckConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Worker configuration file (TOML or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write debug logs to this file
    #[arg(short, long)]
    pub debuglog: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CheckConfigArgs {
    /// Worker configuration file (TOML or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
