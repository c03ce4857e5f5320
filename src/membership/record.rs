//! # Membership Records
//!
//! One record pairs one principal with one authority.
//!
//! Records are created in two steps: the store hands out a
//! [`MembershipDraft`] carrying a freshly assigned id, the caller fills in
//! both fields, and [`MembershipDraft::build`] produces the immutable
//! [`MembershipRecord`]. Field bounds are enforced while filling in, so an
//! overflowing value fails before anything reaches the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{MembershipError, MembershipResult};

/// Store-assigned record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Columns of the membership relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Primary key
    Id,
    /// The user side of the pairing
    Principal,
    /// The role/group side of the pairing
    Authority,
}

impl Field {
    /// Column name as persisted
    pub fn column_name(&self) -> &'static str {
        match self {
            Field::Id => "_URI",
            Field::Principal => "USER",
            Field::Authority => "GRANTED_AUTHORITY",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// Maximum lengths, in characters, of the string columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBounds {
    pub principal_max_len: usize,
    pub authority_max_len: usize,
}

impl FieldBounds {
    /// Default bound for URI-typed columns
    pub const URI_MAX_LEN: usize = 80;

    pub fn max_len(&self, field: Field) -> Option<usize> {
        match field {
            Field::Id => None,
            Field::Principal => Some(self.principal_max_len),
            Field::Authority => Some(self.authority_max_len),
        }
    }

    /// Check a value against the bound of `field`
    pub fn check(&self, field: Field, value: &str) -> MembershipResult<()> {
        if value.is_empty() {
            return Err(MembershipError::EmptyField(field));
        }
        let len = value.chars().count();
        match self.max_len(field) {
            Some(max) if len > max => Err(MembershipError::FieldOverflow { field, len, max }),
            _ => Ok(()),
        }
    }
}

impl Default for FieldBounds {
    fn default() -> Self {
        Self {
            principal_max_len: Self::URI_MAX_LEN,
            authority_max_len: Self::URI_MAX_LEN,
        }
    }
}

/// Addresses one record for deletion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub table: String,
    pub id: RecordId,
}

impl EntityKey {
    pub fn new(table: impl Into<String>, id: RecordId) -> Self {
        Self {
            table: table.into(),
            id,
        }
    }
}

/// A persisted (principal, authority) pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    id: RecordId,
    table: String,
    principal: String,
    authority: String,
    created_at: DateTime<Utc>,
    created_by: String,
}

impl MembershipRecord {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Acting principal that created the record
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Value of a column as a string
    pub fn field_value(&self, field: Field) -> String {
        match field {
            Field::Id => self.id.to_string(),
            Field::Principal => self.principal.clone(),
            Field::Authority => self.authority.clone(),
        }
    }

    pub(crate) fn field_str(&self, field: Field) -> Option<&str> {
        match field {
            Field::Id => None,
            Field::Principal => Some(&self.principal),
            Field::Authority => Some(&self.authority),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.table.clone(), self.id)
    }
}

/// An unsaved record whose fields are still being filled in
#[derive(Debug, Clone)]
pub struct MembershipDraft {
    id: RecordId,
    table: String,
    bounds: FieldBounds,
    created_by: String,
    principal: Option<String>,
    authority: Option<String>,
}

impl MembershipDraft {
    /// Only stores hand out drafts; they own id assignment.
    pub fn new(
        id: RecordId,
        table: impl Into<String>,
        bounds: FieldBounds,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id,
            table: table.into(),
            bounds,
            created_by: created_by.into(),
            principal: None,
            authority: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn set_principal(&mut self, value: &str) -> MembershipResult<()> {
        self.bounds.check(Field::Principal, value)?;
        self.principal = Some(value.to_string());
        Ok(())
    }

    pub fn set_authority(&mut self, value: &str) -> MembershipResult<()> {
        self.bounds.check(Field::Authority, value)?;
        self.authority = Some(value.to_string());
        Ok(())
    }

    /// Freeze the draft into a record
    pub fn build(self) -> MembershipResult<MembershipRecord> {
        let principal = self
            .principal
            .ok_or(MembershipError::MissingField(Field::Principal))?;
        let authority = self
            .authority
            .ok_or(MembershipError::MissingField(Field::Authority))?;

        Ok(MembershipRecord {
            id: self.id,
            table: self.table,
            principal,
            authority,
            created_at: Utc::now(),
            created_by: self.created_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> MembershipDraft {
        MembershipDraft::new(
            RecordId::generate(),
            "_user_granted_authority",
            FieldBounds::default(),
            "system",
        )
    }

    #[test]
    fn test_draft_builds_record() {
        let before = Utc::now();
        let mut d = draft();
        let id = d.id();
        d.set_principal("uid:alice").unwrap();
        d.set_authority("GROUP_DATA_VIEWERS").unwrap();
        let record = d.build().unwrap();

        assert_eq!(record.id(), id);
        assert_eq!(record.principal(), "uid:alice");
        assert_eq!(record.authority(), "GROUP_DATA_VIEWERS");
        assert_eq!(record.created_by(), "system");
        assert!(record.created_at() >= before && record.created_at() <= Utc::now());
        assert_eq!(record.key().id, id);
    }

    #[test]
    fn test_overflow_fails_fast() {
        let mut d = draft();
        let long = "x".repeat(FieldBounds::URI_MAX_LEN + 1);
        let err = d.set_principal(&long).unwrap_err();
        assert!(matches!(
            err,
            MembershipError::FieldOverflow { field: Field::Principal, len: 81, max: 80 }
        ));
    }

    #[test]
    fn test_bound_counts_characters_not_bytes() {
        let mut d = draft();
        let value = "é".repeat(FieldBounds::URI_MAX_LEN);
        assert!(d.set_authority(&value).is_ok());
    }

    #[test]
    fn test_exact_bound_accepted() {
        let mut d = draft();
        assert!(d.set_principal(&"p".repeat(80)).is_ok());
    }

    #[test]
    fn test_empty_value_rejected() {
        let mut d = draft();
        assert!(matches!(
            d.set_authority(""),
            Err(MembershipError::EmptyField(Field::Authority))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut d = draft();
        d.set_principal("uid:alice").unwrap();
        assert!(matches!(
            d.build(),
            Err(MembershipError::MissingField(Field::Authority))
        ));
    }

    #[test]
    fn test_field_values() {
        let mut d = draft();
        d.set_principal("uid:bob").unwrap();
        d.set_authority("ROLE_USER").unwrap();
        let record = d.build().unwrap();
        assert_eq!(record.field_value(Field::Principal), "uid:bob");
        assert_eq!(record.field_value(Field::Id), record.id().to_string());
        assert_eq!(record.field_str(Field::Id), None);
    }
}
