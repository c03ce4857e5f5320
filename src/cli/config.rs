//! Configuration file
//!
//! JSON, one object:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/aerogrant",
//!   "superuser": "uid:root",
//!   "admin_authority": "ROLE_ACCESS_ADMIN",
//!   "principal_max_len": 80,
//!   "authority_max_len": 80,
//!   "duplicate_policy": "preserve",
//!   "audit_log": true
//! }
//! ```
//!
//! Only `data_dir` is required.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::membership::{DuplicatePolicy, FieldBounds, GrantedAuthorityName, MembershipConfig};
use crate::observability::{log_event_with_fields, Event};

use super::errors::{CliError, CliResult};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Principal made sole admin by `bootstrap`
    #[serde(default)]
    pub superuser: Option<String>,

    /// Authority reserved for the superuser
    #[serde(default = "default_admin_authority")]
    pub admin_authority: String,

    #[serde(default = "default_max_len")]
    pub principal_max_len: usize,

    #[serde(default = "default_max_len")]
    pub authority_max_len: usize,

    /// "preserve" (default) or "collapse"
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Append an audit record per change to `<data_dir>/grants/audit.log`
    #[serde(default = "default_audit_log")]
    pub audit_log: bool,
}

fn default_admin_authority() -> String {
    GrantedAuthorityName::AccessAdmin.as_str().to_string()
}
fn default_max_len() -> usize {
    FieldBounds::URI_MAX_LEN
}
fn default_audit_log() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config = Self::from_json(&content)?;

        let source = path.display().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("data_dir", config.data_dir.as_str()), ("path", source.as_str())],
        );

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }

        let membership = self.to_membership_config();
        membership.validate()?;

        if let Some(superuser) = &self.superuser {
            membership
                .bounds
                .check(crate::membership::Field::Principal, superuser)
                .map_err(|e| CliError::config_error(format!("superuser: {}", e)))?;
        }

        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn to_membership_config(&self) -> MembershipConfig {
        MembershipConfig {
            admin_authority: self.admin_authority.clone(),
            bounds: FieldBounds {
                principal_max_len: self.principal_max_len,
                authority_max_len: self.authority_max_len,
            },
            duplicate_policy: self.duplicate_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::from_json(r#"{"data_dir":"/tmp/grants"}"#).unwrap();
        assert_eq!(config.admin_authority, "ROLE_ACCESS_ADMIN");
        assert_eq!(config.principal_max_len, 80);
        assert_eq!(config.authority_max_len, 80);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Preserve);
        assert!(config.audit_log);
        assert!(config.superuser.is_none());
    }

    #[test]
    fn test_collapse_policy_parsed() {
        let config =
            Config::from_json(r#"{"data_dir":"/tmp/grants","duplicate_policy":"collapse"}"#).unwrap();
        assert_eq!(config.to_membership_config().duplicate_policy, DuplicatePolicy::Collapse);
    }

    #[test]
    fn test_missing_data_dir_rejected() {
        let err = Config::from_json(r#"{"superuser":"uid:root"}"#).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_zero_bound_rejected() {
        let err = Config::from_json(r#"{"data_dir":"/tmp/grants","principal_max_len":0}"#).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_oversized_superuser_rejected() {
        let json = format!(r#"{{"data_dir":"/tmp/grants","superuser":"{}"}}"#, "u".repeat(81));
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(Config::from_json(r#"{"data_dir":"/tmp/grants","duplicate_policy":"merge"}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aerogrant.json");
        fs::write(&path, r#"{"data_dir":"/tmp/grants","audit_log":false}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.audit_log);
        assert_eq!(config.data_path(), Path::new("/tmp/grants"));
    }
}
