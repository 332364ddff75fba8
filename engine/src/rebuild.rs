//! Per-child bucket rebuild.
//!
//! [`compute`] is the pure part: it turns a calendar snapshot, a child and the
//! child's stored rows into the complete set of `Due`/`Late` rows plus the
//! resulting status. [`RebuildEngine`] wires it to storage.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::age::{advance, start_of_day, Age};
use crate::batch::RebuildOptions;
use crate::calendar::{CalendarSnapshot, DoseDescriptor};
use crate::eligibility::is_eligible;
use crate::error::Result;
use crate::models::{BucketRecord, Child, ComplianceStatus, DoseKey, DoseState};
use crate::status::{aggregate, status_of};
use crate::store::VaccinationStore;

/// Outcome of computing one child's buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebuild {
    pub child_id: Uuid,
    /// `Due` and `Late` rows, vaccines by id and doses ascending
    pub entries: Vec<BucketRecord>,
    pub status: ComplianceStatus,
}

impl Rebuild {
    pub fn due(&self) -> impl Iterator<Item = &BucketRecord> {
        self.entries.iter().filter(|r| r.state == DoseState::Due)
    }

    pub fn late(&self) -> impl Iterator<Item = &BucketRecord> {
        self.entries.iter().filter(|r| r.state == DoseState::Late)
    }
}

/// Date a dose is targeted at: birth plus the specific age, or plus the end
/// of the window when no specific age is configured.
pub fn target_date(birth_date: NaiveDate, descriptor: &DoseDescriptor) -> NaiveDate {
    match descriptor.specific_age.or(descriptor.max_age) {
        Some(amount) => advance(birth_date, descriptor.age_unit, amount),
        None => birth_date,
    }
}

/// Places one dose relative to its window.
///
/// Returns `None` before the window opens, and also past the window while the
/// target date is still ahead (possible because ages use fixed day ratios but
/// target dates use calendar arithmetic).
pub fn classify(
    descriptor: &DoseDescriptor,
    birth_date: NaiveDate,
    age: &Age,
    now: DateTime<Utc>,
) -> Option<(DoseState, NaiveDate)> {
    let age = age.in_unit(descriptor.age_unit);
    let min_age = i64::from(descriptor.min_age);
    let max_age = descriptor.max_age.map(i64::from);
    let target = target_date(birth_date, descriptor);

    if age >= min_age && max_age.map_or(true, |max| age <= max) {
        return Some((DoseState::Due, target));
    }

    match max_age {
        Some(max) if age > max && start_of_day(target) < now => Some((DoseState::Late, target)),
        _ => None,
    }
}

/// Computes the `Due`/`Late` rows and status of `child` from scratch.
///
/// `records` are the rows currently stored for the child; only the externally
/// owned states among them are consulted, existing `Due`/`Late` rows are
/// ignored since they are about to be replaced.
pub fn compute(
    snapshot: &CalendarSnapshot,
    child: &Child,
    records: &[BucketRecord],
    now: DateTime<Utc>,
) -> Rebuild {
    if snapshot.is_empty() {
        return Rebuild {
            child_id: child.id,
            entries: Vec::new(),
            status: ComplianceStatus::UpToDate,
        };
    }

    let taken: HashSet<DoseKey> = records
        .iter()
        .filter(|record| record.state.takes_precedence())
        .map(|record| record.key)
        .collect();
    let age = Age::between(child.birth_date, now);

    let mut entries = Vec::new();
    for (vaccine_id, doses) in snapshot.dose_map() {
        let eligible = snapshot
            .vaccine(vaccine_id)
            .map_or(true, |vaccine| is_eligible(vaccine, child.gender));
        if !eligible {
            continue;
        }

        for (&dose, descriptor) in doses {
            let key = DoseKey {
                vaccine_id: *vaccine_id,
                calendar_id: descriptor.calendar_id,
                dose,
            };
            if taken.contains(&key) {
                continue;
            }

            if let Some((state, date)) = classify(descriptor, child.birth_date, &age, now) {
                entries.push(BucketRecord::new(key, state, Some(date)));
            }
        }
    }

    let late = entries.iter().filter(|r| r.state == DoseState::Late).count();
    let overdue = records
        .iter()
        .filter(|r| r.state == DoseState::Overdue)
        .count();

    Rebuild {
        child_id: child.id,
        entries,
        status: aggregate(late, overdue),
    }
}

/// Rebuilds children's buckets against a [`VaccinationStore`]
pub struct RebuildEngine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) options: RebuildOptions,
}

impl<S> Clone for RebuildEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options,
        }
    }
}

impl<S> RebuildEngine<S>
where
    S: VaccinationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            options: RebuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RebuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads the calendar and derives the dose map and vaccine metadata
    pub async fn load_snapshot(&self) -> Result<Arc<CalendarSnapshot>> {
        let entries = self.store.list_entries().await?;
        Ok(Arc::new(CalendarSnapshot::build(&entries)))
    }

    /// Rebuilds one child as of now.
    ///
    /// Returns the new status, or `None` when the child does not exist.
    pub async fn rebuild_one(&self, child_id: Uuid) -> Result<Option<ComplianceStatus>> {
        self.rebuild_one_at(child_id, Utc::now()).await
    }

    pub async fn rebuild_one_at(
        &self,
        child_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ComplianceStatus>> {
        let snapshot = self.load_snapshot().await?;
        self.rebuild_with(&snapshot, child_id, now).await
    }

    /// Rebuilds one child against an already loaded calendar
    #[instrument(skip(self, snapshot), fields(entries = snapshot.entry_count()))]
    pub async fn rebuild_with(
        &self,
        snapshot: &CalendarSnapshot,
        child_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ComplianceStatus>> {
        let Some(profile) = self.store.get(child_id).await? else {
            tracing::debug!("child not found, nothing to rebuild");
            return Ok(None);
        };

        let rebuild = compute(snapshot, &profile.child, &profile.records, now);
        self.store
            .replace_computed(child_id, &rebuild.entries, rebuild.status)
            .await?;

        tracing::debug!(
            due = rebuild.due().count(),
            late = rebuild.late().count(),
            status = %rebuild.status,
            "rebuilt vaccination buckets"
        );
        Ok(Some(rebuild.status))
    }

    /// Rebuilds one child, logging instead of returning any failure.
    ///
    /// For flows that must not be blocked by a rebuild.
    pub async fn rebuild_one_best_effort(&self, child_id: Uuid) -> Option<ComplianceStatus> {
        match self.rebuild_one(child_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(%child_id, error = %err, "vaccination rebuild failed");
                None
            }
        }
    }

    /// Recomputes and stores the status from the rows currently stored,
    /// without touching any bucket.
    #[instrument(skip(self))]
    pub async fn refresh_status(&self, child_id: Uuid) -> Result<Option<ComplianceStatus>> {
        let Some(profile) = self.store.get(child_id).await? else {
            return Ok(None);
        };

        let status = status_of(&profile.records);
        if status != profile.child.status {
            self.store.set_status(child_id, status).await?;
        }
        Ok(Some(status))
    }
}
