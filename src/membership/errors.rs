//! # Membership Errors
//!
//! Error types for the membership subsystem.
//!
//! Three classes matter to callers:
//! - Construction errors (overflowing or missing fields) are fatal and abort
//!   the operation before any mutation is submitted.
//! - Store errors are propagated unchanged and may be retried by the caller.
//! - Notifier errors never reach the caller; they are logged and counted.

use thiserror::Error;

use super::record::Field;

/// Result type for membership operations
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Membership subsystem errors
#[derive(Debug, Clone, Error)]
pub enum MembershipError {
    // ==================
    // Construction Errors
    // ==================

    /// Value is longer than the field's storage bound
    #[error("Value for {field} is {len} characters, bound is {max}")]
    FieldOverflow { field: Field, len: usize, max: usize },

    /// Value is empty
    #[error("Value for {0} must not be empty")]
    EmptyField(Field),

    /// Draft was built before every field was set
    #[error("Field {0} was never set")]
    MissingField(Field),

    // ==================
    // Store Errors
    // ==================

    /// The relation store failed a query, put or delete
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// First-time relation creation failed; nothing was cached
    #[error("Relation initialization failed: {0}")]
    RelationInit(#[source] Box<MembershipError>),

    /// Persisted relation data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    // ==================
    // Configuration Errors
    // ==================

    /// Invalid membership configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MembershipError {
    /// Shorthand for a store failure
    pub fn store(message: impl Into<String>) -> Self {
        MembershipError::StoreUnavailable(message.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            MembershipError::FieldOverflow { .. } => "AERO_GRANT_FIELD_OVERFLOW",
            MembershipError::EmptyField(_) => "AERO_GRANT_EMPTY_FIELD",
            MembershipError::MissingField(_) => "AERO_GRANT_MISSING_FIELD",
            MembershipError::StoreUnavailable(_) => "AERO_GRANT_STORE_UNAVAILABLE",
            MembershipError::RelationInit(_) => "AERO_GRANT_RELATION_INIT_FAILED",
            MembershipError::Corruption(_) => "AERO_GRANT_DATA_CORRUPTION",
            MembershipError::Config(_) => "AERO_GRANT_CONFIG_INVALID",
        }
    }

    /// Construction errors signal a programmer or data error
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            MembershipError::FieldOverflow { .. }
                | MembershipError::EmptyField(_)
                | MembershipError::MissingField(_)
        )
    }

    /// Fatal errors must abort the operation and are never retried.
    /// A failed relation init is as fatal as its cause.
    pub fn is_fatal(&self) -> bool {
        match self {
            MembershipError::RelationInit(inner) => inner.is_fatal(),
            MembershipError::Corruption(_) => true,
            MembershipError::Config(_) => true,
            other => other.is_construction_error(),
        }
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        match self {
            MembershipError::StoreUnavailable(_) => true,
            MembershipError::RelationInit(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

/// Failure raised by a change notifier
///
/// Never propagated to reconciliation callers.
#[derive(Debug, Clone, Error)]
#[error("Change notifier failed: {message}")]
pub struct NotifierError {
    message: String,
}

impl NotifierError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
