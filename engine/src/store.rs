//! Storage seams the engine depends on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{BucketRecord, CalendarEntry, ChildProfile, ComplianceStatus};

#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Every calendar entry with its dose assignments and vaccine metadata,
    /// in a stable order.
    async fn list_entries(&self) -> Result<Vec<CalendarEntry>, StoreError>;
}

#[async_trait]
pub trait ChildRepository: Send + Sync {
    /// The child and all of its bucket rows, or `None` when it does not exist
    async fn get(&self, child_id: Uuid) -> Result<Option<ChildProfile>, StoreError>;

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    async fn set_status(&self, child_id: Uuid, status: ComplianceStatus) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Replaces all `Due` and `Late` rows of the child with `entries` and
    /// persists `status`, as one atomic unit.
    ///
    /// Entries whose key is already held by an externally owned state are
    /// dropped rather than duplicated.
    async fn replace_computed(
        &self,
        child_id: Uuid,
        entries: &[BucketRecord],
        status: ComplianceStatus,
    ) -> Result<(), StoreError>;
}

/// Everything the rebuild engine reads and writes
pub trait VaccinationStore: CalendarRepository + ChildRepository + BucketStore {}

impl<T> VaccinationStore for T where T: CalendarRepository + ChildRepository + BucketStore {}
