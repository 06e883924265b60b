//! Per-type enrichment of directory records.

use async_trait::async_trait;

use crate::object_types::{Enrichment, ObjectTypeDescriptor};
use crate::{AadError, AadResult, DirectoryRecord};

/// Property holding owner ids.
pub const OWNERS: &str = "owners";
/// Property holding member ids.
pub const MEMBERS: &str = "members";

/// Fetches ids linked to an object through a navigation property.
#[async_trait]
pub trait LinkedResources: Send + Sync {
    /// Returns the ids of `{resource_path}/{object_id}/{property}`.
    async fn linked_ids(
        &self,
        resource_path: &str,
        object_id: &str,
        property: &str,
    ) -> AadResult<Vec<String>>;
}

/// Attaches linked sub-resources to `record` according to the type's
/// enrichment. Members are resolved before owners.
///
/// # Errors
///
/// Returns `AadError::MissingObjectId` when the record needs expansion but
/// has no id, and propagates fetch errors.
pub async fn enrich(
    descriptor: &ObjectTypeDescriptor,
    mut record: DirectoryRecord,
    links: &dyn LinkedResources,
) -> AadResult<DirectoryRecord> {
    let enrichment = descriptor.enrichment;
    if enrichment.is_plain() {
        return Ok(record);
    }

    let object_id = record
        .object_id()
        .ok_or_else(|| AadError::MissingObjectId {
            type_name: descriptor.type_name.to_string(),
        })?
        .to_string();

    for property in enrichment.properties() {
        let ids = if *property == OWNERS && record.is_first_party() {
            Vec::new()
        } else {
            links
                .linked_ids(descriptor.resource_path, &object_id, property)
                .await?
        };
        record.set_links(property, ids);
    }

    Ok(record)
}

impl Enrichment {
    /// Linked properties this enrichment adds, in fetch order.
    #[must_use]
    pub fn properties(self) -> &'static [&'static str] {
        match self {
            Self::Plain => &[],
            Self::Owners => &[OWNERS],
            Self::Members => &[MEMBERS],
            Self::OwnersAndMembers => &[MEMBERS, OWNERS],
        }
    }
}
