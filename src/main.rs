//! aerogrant CLI entry point
//!
//! All logic is delegated to the CLI module. Failures are reported as a
//! JSON error response on stdout and a non-zero exit status.

use aerogrant::cli;

fn main() {
    if let Err(e) = cli::run() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
