mod cli;
mod engine;
mod error;
mod metrics;
mod model;
mod orchestrator;
mod storage;
mod store;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod workers;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Log to stderr. The TUI owns the terminal, so it only gets warnings unless `RUST_LOG` says otherwise.
fn init_tracing(interactive: bool) {
    let default = if interactive { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = cfg!(not(feature = "tui")) || args.is_headless();
    init_tracing(!is_non_tui);

    cli::run(args).await?;
    // Explicitly exit with code 0 on success; worker pools may still hold threads.
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
