//! Command-line interface
//!
//! - init: create the data directory and record the local node
//! - start: open the store, join the group and serve until Ctrl-C
//! - members: list persisted node records
//! - inspect: dump store keys

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, inspect, members, run, run_command, start};
pub use config::Config;
pub use errors::{CliError, CliResult};
