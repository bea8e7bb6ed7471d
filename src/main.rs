//! WinScout - window discovery and activation for macOS
//!
//! Binary entry point: parses the command line, initializes logging and
//! hands off to the CLI executor.

use clap::Parser;
use tracing::debug;
use winscout::{
    cli::{run_cli, ScoutCli},
    logging::{init_logging, LogConfig, LogLevel},
};

#[tokio::main]
async fn main() {
    let cli = ScoutCli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
        log_config.performance_tracing = true;
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    debug!("WinScout v{}", env!("CARGO_PKG_VERSION"));

    let code = run_cli(cli).await;
    std::process::exit(code);
}
