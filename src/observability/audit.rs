//! Membership audit trail
//!
//! - One record per applied insertion or deletion
//! - Append-only, one JSON record per line
//! - File appends are synced before `append` returns
//!
//! Audit failures never undo or fail the mutation they describe; the
//! caller logs them and moves on.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::membership::MembershipRecord;

/// Audit action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Record inserted by reconciliation
    MembershipGranted,
    /// Record deleted by reconciliation or bootstrap
    MembershipRevoked,
    /// Record deleted because its principal was removed
    PrincipalPurged,
    /// Superuser admin record inserted by bootstrap
    SuperuserBootstrapped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MembershipGranted => "MEMBERSHIP_GRANTED",
            AuditAction::MembershipRevoked => "MEMBERSHIP_REVOKED",
            AuditAction::PrincipalPurged => "PRINCIPAL_PURGED",
            AuditAction::SuperuserBootstrapped => "SUPERUSER_BOOTSTRAPPED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    /// Acting principal
    #[serde(rename = "operator", skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            operator_id: None,
            principal: None,
            authority: None,
            record_id: None,
            error_message: None,
        }
    }

    pub fn with_operator(mut self, id: impl Into<String>) -> Self {
        self.operator_id = Some(id.into());
        self
    }

    /// Copy the pairing and id of `record`
    pub fn with_membership(mut self, record: &MembershipRecord) -> Self {
        self.principal = Some(record.principal().to_string());
        self.authority = Some(record.authority().to_string());
        self.record_id = Some(record.id().as_uuid());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// One JSON line, without the trailing newline
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Append-only audit sink
pub trait AuditLog: Send + Sync {
    /// Append a record; it must be durable once this returns
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "audit log lock poisoned")
}

/// File-backed audit log, one JSON record per line, synced per append
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json()?;
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.records.lock().map_err(|_| poisoned())?.push(record.clone());
        Ok(())
    }
}
