//! CLI command implementations for hhsim

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliConfig;
use crate::error::CliResult;

pub mod init;
pub mod inspect;
pub mod run;
pub mod sweep;

/// hhsim - conductance-based neuron simulator
#[derive(Parser, Debug)]
#[command(
    name = "hhsim",
    version,
    about = "Conductance-based (Hodgkin-Huxley) point neuron simulator",
    long_about = "hhsim integrates single-compartment membrane models built from leak and \
                  voltage-gated channel species. Describe an experiment in TOML, run it to \
                  get voltage and gating traces, or sweep stimulus amplitudes for an f-I curve."
)]
pub struct HhsimCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write template experiment files
    #[command(alias = "new")]
    Init(init::InitCommand),

    /// Run one experiment and write its time series
    Run(run::RunCommand),

    /// Sweep step amplitudes and write an f-I table
    Sweep(sweep::SweepCommand),

    /// Show the channel table and resting state of an experiment
    Inspect(inspect::InspectCommand),
}

impl HhsimCli {
    /// Load the user configuration named by `--config`, or the default one
    pub fn load_config(&self) -> CliResult<CliConfig> {
        CliConfig::resolve(self.config.as_deref())
    }

    /// Execute the CLI command
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        match self.command {
            Commands::Init(cmd) => cmd.execute(),
            Commands::Run(cmd) => cmd.execute(config),
            Commands::Sweep(cmd) => cmd.execute(config),
            Commands::Inspect(cmd) => cmd.execute(),
        }
    }
}
