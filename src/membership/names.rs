//! Anchors, actors and well-known authority names

use std::fmt;

use super::record::{Field, MembershipRecord};

/// The side of a pairing held fixed during a reconciliation
///
/// The other side is the subject whose set is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchor {
    Principal(String),
    Authority(String),
}

impl Anchor {
    pub fn principal(value: impl Into<String>) -> Self {
        Anchor::Principal(value.into())
    }

    pub fn authority(value: impl Into<String>) -> Self {
        Anchor::Authority(value.into())
    }

    /// Column the anchor filters on
    pub fn field(&self) -> Field {
        match self {
            Anchor::Principal(_) => Field::Principal,
            Anchor::Authority(_) => Field::Authority,
        }
    }

    /// Column whose values are reconciled
    pub fn subject_field(&self) -> Field {
        match self {
            Anchor::Principal(_) => Field::Authority,
            Anchor::Authority(_) => Field::Principal,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Anchor::Principal(v) | Anchor::Authority(v) => v,
        }
    }

    /// Subject value carried by `record`
    pub fn subject_of<'r>(&self, record: &'r MembershipRecord) -> &'r str {
        match self {
            Anchor::Principal(_) => record.authority(),
            Anchor::Authority(_) => record.principal(),
        }
    }

    /// `(principal, authority)` for a record pairing this anchor with `subject`
    pub fn pair_with<'a>(&'a self, subject: &'a str) -> (&'a str, &'a str) {
        match self {
            Anchor::Principal(p) => (p, subject),
            Anchor::Authority(a) => (subject, a),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.value())
    }
}

/// Acting principal on whose behalf store calls are made
///
/// Opaque to the membership layer; stores use it for auditing and
/// permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The daemon itself, used during bootstrap
    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Authorities the system itself knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantedAuthorityName {
    /// Unauthenticated access
    Anonymous,
    /// Any registered user
    User,
    /// May submit data
    DataCollector,
    /// May read submitted data
    DataViewer,
    /// May manage forms and data
    DataOwner,
    /// May manage users and group membership
    SiteAccessAdmin,
    /// Held only by the superuser; bootstrapped at startup
    AccessAdmin,
}

impl GrantedAuthorityName {
    pub const ALL: [GrantedAuthorityName; 7] = [
        GrantedAuthorityName::Anonymous,
        GrantedAuthorityName::User,
        GrantedAuthorityName::DataCollector,
        GrantedAuthorityName::DataViewer,
        GrantedAuthorityName::DataOwner,
        GrantedAuthorityName::SiteAccessAdmin,
        GrantedAuthorityName::AccessAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantedAuthorityName::Anonymous => "ROLE_ANONYMOUS",
            GrantedAuthorityName::User => "ROLE_USER",
            GrantedAuthorityName::DataCollector => "ROLE_DATA_COLLECTOR",
            GrantedAuthorityName::DataViewer => "ROLE_DATA_VIEWER",
            GrantedAuthorityName::DataOwner => "ROLE_DATA_OWNER",
            GrantedAuthorityName::SiteAccessAdmin => "ROLE_SITE_ACCESS_ADMIN",
            GrantedAuthorityName::AccessAdmin => "ROLE_ACCESS_ADMIN",
        }
    }

    /// Exact-match lookup
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|n| n.as_str() == name)
    }
}

impl fmt::Display for GrantedAuthorityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
