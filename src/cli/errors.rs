//! CLI error types
//!
//! Every CLI error is fatal to the invocation: it is printed as a JSON
//! error response and the process exits with status 1. Membership errors
//! keep their own `AERO_GRANT_*` code.

use std::fmt;
use std::io;

use crate::membership::MembershipError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, audit log)
    IoError,
    /// `bootstrap` without a superuser on the command line or in config
    MissingSuperuser,
    /// Error raised by the membership service
    Membership(&'static str),
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AERO_CLI_CONFIG_ERROR",
            Self::IoError => "AERO_CLI_IO_ERROR",
            Self::MissingSuperuser => "AERO_CLI_MISSING_SUPERUSER",
            Self::Membership(code) => code,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn missing_superuser() -> Self {
        Self::new(
            CliErrorCode::MissingSuperuser,
            "No superuser given. Pass --superuser or set \"superuser\" in the config file.",
        )
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<MembershipError> for CliError {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::Config(msg) => Self::config_error(msg),
            other => Self::new(CliErrorCode::Membership(other.code()), other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
