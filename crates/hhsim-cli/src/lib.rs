//! hhsim CLI crate
//!
//! Reads TOML experiment files, hands them to `hhsim-core` and writes the
//! resulting traces or f-I tables as CSV or JSON. The binary (src/main.rs)
//! wires up logging and argument parsing and calls [`HhsimCli::execute`];
//! the modules are exposed as a library for testing.

pub mod commands;
pub mod config;
pub mod error;
pub mod experiment;
pub mod output;

pub use commands::HhsimCli;
pub use error::{CliError, CliResult};
