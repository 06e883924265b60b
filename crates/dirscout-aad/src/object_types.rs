//! Static registry of enumerable directory object types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory object kinds this collector knows how to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    User,
    Group,
    Application,
    ServicePrincipal,
    Role,
}

impl ObjectKind {
    /// All kinds in registry order.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::User,
        ObjectKind::Group,
        ObjectKind::Application,
        ObjectKind::ServicePrincipal,
        ObjectKind::Role,
    ];

    /// Returns the registry entry for this kind.
    #[must_use]
    pub fn descriptor(self) -> &'static ObjectTypeDescriptor {
        match self {
            Self::User => &OBJECT_TYPES[0],
            Self::Group => &OBJECT_TYPES[1],
            Self::Application => &OBJECT_TYPES[2],
            Self::ServicePrincipal => &OBJECT_TYPES[3],
            Self::Role => &OBJECT_TYPES[4],
        }
    }
}

/// Linked sub-resources attached to each record of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enrichment {
    /// Records are written as fetched.
    Plain,
    /// Adds `owners`; first-party principals get an empty list without a fetch.
    Owners,
    /// Adds `members`.
    Members,
    /// Adds `members` and `owners`.
    OwnersAndMembers,
}

impl Enrichment {
    #[must_use]
    pub fn is_plain(self) -> bool {
        matches!(self, Self::Plain)
    }
}

/// One enumerable type.
#[derive(Debug, PartialEq, Eq)]
pub struct ObjectTypeDescriptor {
    pub kind: ObjectKind,
    /// Name used for sink output and coverage.
    pub type_name: &'static str,
    /// REST path segment.
    pub resource_path: &'static str,
    pub enrichment: Enrichment,
    /// Key in the backfill document, for types eligible for backfill.
    pub backfill_key: Option<&'static str>,
}

impl fmt::Display for ObjectTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Every enumerable type, in launch order.
pub static OBJECT_TYPES: [ObjectTypeDescriptor; 5] = [
    ObjectTypeDescriptor {
        kind: ObjectKind::User,
        type_name: "AADUser",
        resource_path: "users",
        enrichment: Enrichment::Plain,
        backfill_key: Some("User"),
    },
    ObjectTypeDescriptor {
        kind: ObjectKind::Group,
        type_name: "AADGroup",
        resource_path: "groups",
        enrichment: Enrichment::OwnersAndMembers,
        backfill_key: Some("Group"),
    },
    ObjectTypeDescriptor {
        kind: ObjectKind::Application,
        type_name: "AADApplication",
        resource_path: "applications",
        enrichment: Enrichment::Owners,
        backfill_key: None,
    },
    ObjectTypeDescriptor {
        kind: ObjectKind::ServicePrincipal,
        type_name: "AADServicePrincipal",
        resource_path: "servicePrincipals",
        enrichment: Enrichment::Owners,
        backfill_key: Some("ServicePrincipal"),
    },
    ObjectTypeDescriptor {
        kind: ObjectKind::Role,
        type_name: "AADRole",
        resource_path: "directoryRoles",
        enrichment: Enrichment::Members,
        backfill_key: None,
    },
];

/// Types that may be scoped by a backfill document.
pub fn backfill_eligible() -> impl Iterator<Item = &'static ObjectTypeDescriptor> {
    OBJECT_TYPES.iter().filter(|d| d.backfill_key.is_some())
}
