//! Monument CLI entry point, grounded on
//! `knhk-workflow-engine/src/bin/knhk-workflow.rs` (`clap` derive,
//! `tracing_subscriber::fmt::init()` before `Cli::parse()`, a `Serve`
//! subcommand).
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Parser, Subcommand};

use monument::config::AppConfig;
use monument::error::MonumentResult;

#[derive(Parser, Debug)]
#[command(name = "monument-server", version, about = "Monument tick coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Override the configured bind address, e.g. 0.0.0.0:8080.
        #[arg(long)]
        bind: Option<String>,

        /// Override the configured data directory for namespace stores.
        #[arg(long)]
        data_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> MonumentResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = AppConfig::load_from_env()?;

    match cli.command {
        Command::Serve { bind, data_dir } => {
            if let Some(bind) = bind {
                config.service.bind_address = bind;
            }
            if let Some(data_dir) = data_dir {
                config.store.data_dir = data_dir;
            }
            config.validate()?;
            monument::api::run(&config).await?;
        }
    }

    Ok(())
}
