//! Population-wide rebuilds.
//!
//! The calendar is read once and the same snapshot is handed to every child.
//! Each child is still rebuilt in its own atomic unit; a failure stops the
//! batch and leaves children already processed rebuilt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::instrument;
use uuid::Uuid;

use crate::calendar::CalendarSnapshot;
use crate::error::{RebuildError, Result};
use crate::models::ComplianceStatus;
use crate::rebuild::RebuildEngine;
use crate::store::VaccinationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Children rebuilt at the same time during a batch; 1 is sequential
    pub concurrency: usize,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl RebuildOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub rebuilt: usize,
    pub up_to_date: usize,
    pub not_up_to_date: usize,
    /// Children listed but gone by the time they were rebuilt
    pub missing: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: Option<ComplianceStatus>) {
        match outcome {
            Some(status) => {
                self.rebuilt += 1;
                match status {
                    ComplianceStatus::UpToDate => self.up_to_date += 1,
                    ComplianceStatus::NotUpToDate => self.not_up_to_date += 1,
                }
            }
            None => self.missing += 1,
        }
    }
}

impl<S> RebuildEngine<S>
where
    S: VaccinationStore + 'static,
{
    pub async fn rebuild_all(&self) -> Result<BatchReport> {
        self.rebuild_all_at(Utc::now()).await
    }

    #[instrument(skip(self), fields(concurrency = self.options.concurrency))]
    pub async fn rebuild_all_at(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let snapshot = self.load_snapshot().await?;
        let child_ids = self.store.list_ids().await?;
        tracing::info!(
            children = child_ids.len(),
            calendar_entries = snapshot.entry_count(),
            "starting vaccination rebuild"
        );

        let report = if self.options.concurrency <= 1 {
            self.rebuild_sequential(&snapshot, child_ids, now).await?
        } else {
            self.rebuild_concurrent(snapshot, child_ids, now).await?
        };

        tracing::info!(
            rebuilt = report.rebuilt,
            up_to_date = report.up_to_date,
            not_up_to_date = report.not_up_to_date,
            missing = report.missing,
            "vaccination rebuild finished"
        );
        Ok(report)
    }

    async fn rebuild_sequential(
        &self,
        snapshot: &CalendarSnapshot,
        child_ids: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for child_id in child_ids {
            let outcome = self.rebuild_with(snapshot, child_id, now).await?;
            report.record(outcome);
        }
        Ok(report)
    }

    /// Keeps at most `concurrency` rebuilds in flight. After the first failure
    /// no new child is started; rebuilds already running are awaited.
    async fn rebuild_concurrent(
        &self,
        snapshot: Arc<CalendarSnapshot>,
        child_ids: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let limit = self.options.concurrency;
        let mut report = BatchReport::default();
        let mut failure: Option<RebuildError> = None;
        let mut pending = child_ids.into_iter();
        let mut tasks = JoinSet::new();

        loop {
            while failure.is_none() && tasks.len() < limit {
                let Some(child_id) = pending.next() else {
                    break;
                };
                let engine = self.clone();
                let snapshot = Arc::clone(&snapshot);
                tasks.spawn(async move {
                    let outcome = engine.rebuild_with(&snapshot, child_id, now).await;
                    (child_id, outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(outcome))) => report.record(outcome),
                Ok((child_id, Err(err))) => {
                    tracing::error!(%child_id, error = %err, "vaccination rebuild failed");
                    failure.get_or_insert(err);
                }
                Err(err) => {
                    failure.get_or_insert(RebuildError::Task(err.to_string()));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}
