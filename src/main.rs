mod app;
mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use subunit_pusher::observability;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            observability::init_logging(args.debuglog.as_deref())?;
            app::run(args.config).await?
        }
        Commands::CheckConfig(args) => {
            observability::init_logging(None)?;
            app::check_config(args.config)?
        }
    }

    Ok(())
}
