//! # hhsim - command line front end
//!
//! Runs conductance-based membrane experiments described in TOML files.

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hhsim_cli::config::CliConfig;
use hhsim_cli::{CliResult, HhsimCli};

fn main() -> CliResult<()> {
    // Parse CLI arguments
    let cli = HhsimCli::parse();

    let (config, config_err) = match cli.load_config() {
        Ok(config) => (config, None),
        Err(err) => (CliConfig::default(), Some(err)),
    };

    // RUST_LOG wins, then --verbose, then the configured level
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Some(err) = config_err {
        warn!("Using default configuration: {}", err);
    }

    // Execute the command
    if let Err(err) = cli.execute(&config) {
        error!("Command failed: {}", err);
        std::process::exit(err.exit_code());
    }

    Ok(())
}
