//! Command-line interface
//!
//! One-shot membership commands against a durable store:
//! - bootstrap: make the superuser the sole admin
//! - grants / members: read pairings
//! - set-grants / set-members: reconcile one anchor to a desired set
//! - purge: remove a principal's records

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command, CommonArgs};
pub use commands::{execute, run, run_command};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_envelope, ok_envelope, write_error, write_response};
