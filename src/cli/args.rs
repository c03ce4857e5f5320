//! CLI argument definitions using clap
//!
//! Commands:
//! - aerogrant bootstrap   --config <path> [--superuser S]
//! - aerogrant grants      --config <path> --principal P
//! - aerogrant members     --config <path> --authority A
//! - aerogrant set-grants  --config <path> --principal P [A...]
//! - aerogrant set-members --config <path> --authority A [P...]
//! - aerogrant purge       --config <path> --principal P

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// aerogrant - deterministic group-membership reconciliation
#[derive(Parser, Debug)]
#[command(name = "aerogrant")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(long, default_value = "./aerogrant.json")]
    pub config: PathBuf,

    /// Acting principal recorded on every store call and audit record
    #[arg(long, default_value = "system")]
    pub actor: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Make the superuser the sole holder of the admin authority
    Bootstrap {
        #[command(flatten)]
        common: CommonArgs,

        /// Overrides `superuser` from the config file
        #[arg(long)]
        superuser: Option<String>,
    },

    /// List the authorities granted to a principal
    Grants {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        principal: String,
    },

    /// List the principals holding an authority
    Members {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        authority: String,
    },

    /// Replace a principal's authorities with exactly the given set
    SetGrants {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        principal: String,

        /// Desired authorities; none revokes everything
        authorities: Vec<String>,
    },

    /// Replace an authority's holders with exactly the given set
    SetMembers {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        authority: String,

        /// Desired principals; none revokes everyone
        principals: Vec<String>,
    },

    /// Remove every record of a principal
    Purge {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        principal: String,
    },
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Bootstrap { common, .. }
            | Command::Grants { common, .. }
            | Command::Members { common, .. }
            | Command::SetGrants { common, .. }
            | Command::SetMembers { common, .. }
            | Command::Purge { common, .. } => common,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
