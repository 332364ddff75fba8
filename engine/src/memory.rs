//! In-process store, used by tests and by callers embedding the engine
//! without a database.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    BucketRecord, CalendarEntry, Child, ChildProfile, ComplianceStatus, DoseKey, DoseState,
};
use crate::store::{BucketStore, CalendarRepository, ChildRepository};

#[derive(Debug, Default)]
struct State {
    calendar: Vec<CalendarEntry>,
    children: BTreeMap<Uuid, Child>,
    records: BTreeMap<Uuid, Vec<BucketRecord>>,
    failing_writes: HashSet<Uuid>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(calendar: Vec<CalendarEntry>) -> Self {
        Self {
            state: RwLock::new(State {
                calendar,
                ..State::default()
            }),
        }
    }

    pub async fn set_calendar(&self, calendar: Vec<CalendarEntry>) {
        self.state.write().await.calendar = calendar;
    }

    pub async fn insert_child(&self, child: Child) {
        let mut state = self.state.write().await;
        state.records.entry(child.id).or_default();
        state.children.insert(child.id, child);
    }

    /// Stores a row as an external flow would, replacing any row with the same key
    pub async fn put_record(&self, child_id: Uuid, record: BucketRecord) {
        let mut state = self.state.write().await;
        let rows = state.records.entry(child_id).or_default();
        rows.retain(|existing| existing.key != record.key);
        rows.push(record);
    }

    pub async fn remove_child(&self, child_id: Uuid) {
        let mut state = self.state.write().await;
        state.children.remove(&child_id);
        state.records.remove(&child_id);
    }

    pub async fn child(&self, child_id: Uuid) -> Option<Child> {
        self.state.read().await.children.get(&child_id).cloned()
    }

    pub async fn records(&self, child_id: Uuid) -> Vec<BucketRecord> {
        self.state
            .read()
            .await
            .records
            .get(&child_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn records_in(&self, child_id: Uuid, state: DoseState) -> Vec<BucketRecord> {
        self.records(child_id)
            .await
            .into_iter()
            .filter(|record| record.state == state)
            .collect()
    }

    /// Makes every later `replace_computed` for the child fail before it
    /// changes anything.
    pub async fn fail_writes_for(&self, child_id: Uuid) {
        self.state.write().await.failing_writes.insert(child_id);
    }
}

#[async_trait]
impl CalendarRepository for InMemoryStore {
    async fn list_entries(&self) -> Result<Vec<CalendarEntry>, StoreError> {
        Ok(self.state.read().await.calendar.clone())
    }
}

#[async_trait]
impl ChildRepository for InMemoryStore {
    async fn get(&self, child_id: Uuid) -> Result<Option<ChildProfile>, StoreError> {
        let state = self.state.read().await;
        Ok(state.children.get(&child_id).map(|child| ChildProfile {
            child: child.clone(),
            records: state.records.get(&child_id).cloned().unwrap_or_default(),
        }))
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.state.read().await.children.keys().copied().collect())
    }

    async fn set_status(&self, child_id: Uuid, status: ComplianceStatus) -> Result<(), StoreError> {
        if let Some(child) = self.state.write().await.children.get_mut(&child_id) {
            child.status = status;
        }
        Ok(())
    }
}

#[async_trait]
impl BucketStore for InMemoryStore {
    async fn replace_computed(
        &self,
        child_id: Uuid,
        entries: &[BucketRecord],
        status: ComplianceStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.failing_writes.contains(&child_id) {
            return Err(StoreError::backend(std::io::Error::other(format!(
                "writes rejected for child {child_id}"
            ))));
        }
        if !state.children.contains_key(&child_id) {
            return Ok(());
        }

        let rows = state.records.entry(child_id).or_default();
        rows.retain(|record| !record.state.is_computed());

        let taken: HashSet<DoseKey> = rows.iter().map(|record| record.key).collect();
        rows.extend(
            entries
                .iter()
                .filter(|entry| entry.state.is_computed() && !taken.contains(&entry.key))
                .cloned(),
        );

        if let Some(child) = state.children.get_mut(&child_id) {
            child.status = status;
        }
        Ok(())
    }
}
