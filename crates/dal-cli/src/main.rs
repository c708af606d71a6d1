//! Helios DAL command-line tool.
//!
//! Compiles indexed queries for every store dialect, runs them against an
//! in-memory store, and inspects paging cursors.

mod args;
mod commands;

use clap::Parser;
use tracing::info;

use args::{Cli, Command};
use commands::TableFile;

/// Initializes the tracing subscriber for logging.
///
/// Events go to stderr so stdout stays machine-readable.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_dal={level},helios_dal_cli={level}")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let output = match &cli.command {
        Command::Compile(args) => {
            let file = TableFile::load(&args.config.config)?;
            commands::compile(&file.table, args)?
        }
        Command::Query(args) => {
            let file = TableFile::load(&args.config.config)?;
            commands::query(&file, args).await?
        }
        Command::Validate(args) => {
            let file = TableFile::load(&args.config)?;
            info!(indexes = file.table.indexes.len(), "Configuration is valid");
            serde_json::json!({"valid": true, "table": file.table, "engine": file.engine()})
        }
        Command::Cursor(command) => commands::cursor(command)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
