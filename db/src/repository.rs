use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;
use vaccination_engine::{
    BucketRecord, BucketStore, CalendarEntry, CalendarRepository, Child, ChildProfile,
    ChildRepository, ComplianceStatus, StoreError,
};

use crate::rows::{group_calendar, BucketColumns, BucketRow, CalendarDoseRow, ChildRow};

/// Vaccination store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create new store instance
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

#[async_trait]
impl CalendarRepository for PgStore {
    /// Entries ordered by position then id, assignments likewise, so dose
    /// number inference is reproducible
    async fn list_entries(&self) -> Result<Vec<CalendarEntry>, StoreError> {
        let rows: Vec<CalendarDoseRow> = sqlx::query_as(
            "SELECT c.id AS calendar_id, c.age_unit, c.specific_age, c.min_age, c.max_age,
                    d.vaccine_id, d.dose_number,
                    v.name AS vaccine_name, v.gender AS vaccine_gender, v.doses_required
             FROM calendar_entries c
             LEFT JOIN calendar_doses d ON d.calendar_id = c.id
             LEFT JOIN vaccines v ON v.id = d.vaccine_id
             ORDER BY c.position, c.id, d.position, d.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let entries = group_calendar(rows)?;
        tracing::debug!(entries = entries.len(), "calendar loaded");
        Ok(entries)
    }
}

#[async_trait]
impl ChildRepository for PgStore {
    async fn get(&self, child_id: Uuid) -> Result<Option<ChildProfile>, StoreError> {
        let row: Option<ChildRow> =
            sqlx::query_as("SELECT id, birth_date, gender, status FROM children WHERE id = $1")
                .bind(child_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let child = Child::try_from(row)?;

        let buckets: Vec<BucketRow> = sqlx::query_as(
            "SELECT vaccine_id, calendar_id, dose, state, event_date
             FROM dose_buckets
             WHERE child_id = $1
             ORDER BY vaccine_id, dose, calendar_id",
        )
        .bind(child_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let records = buckets
            .into_iter()
            .map(BucketRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ChildProfile { child, records }))
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        sqlx::query_scalar("SELECT id FROM children ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn set_status(&self, child_id: Uuid, status: ComplianceStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE children SET status = $2 WHERE id = $1")
            .bind(child_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl BucketStore for PgStore {
    /// Delete, insert and status update share one transaction. The child row
    /// is locked first so rebuilds of the same child are serialized.
    async fn replace_computed(
        &self,
        child_id: Uuid,
        entries: &[BucketRecord],
        status: ComplianceStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM children WHERE id = $1 FOR UPDATE")
                .bind(child_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        if locked.is_none() {
            tracing::debug!(%child_id, "child removed before its rebuild was stored");
            return Ok(());
        }

        sqlx::query("DELETE FROM dose_buckets WHERE child_id = $1 AND state IN ('due', 'late')")
            .bind(child_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let columns = BucketColumns::from_records(entries.iter().filter(|e| e.state.is_computed()));
        if !columns.is_empty() {
            // Rows of the externally owned states win over computed ones
            let inserted = sqlx::query(
                "INSERT INTO dose_buckets (child_id, vaccine_id, calendar_id, dose, state, event_date)
                 SELECT $1, t.vaccine_id, t.calendar_id, t.dose, t.state, t.event_date
                 FROM UNNEST($2::uuid[], $3::uuid[], $4::int4[], $5::text[], $6::date[])
                      AS t(vaccine_id, calendar_id, dose, state, event_date)
                 ON CONFLICT (child_id, vaccine_id, calendar_id, dose) DO NOTHING",
            )
            .bind(child_id)
            .bind(&columns.vaccine_ids)
            .bind(&columns.calendar_ids)
            .bind(&columns.doses)
            .bind(&columns.states)
            .bind(&columns.dates)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();

            let skipped = (columns.doses.len() as u64).saturating_sub(inserted);
            if skipped > 0 {
                tracing::warn!(%child_id, skipped, "computed rows collided with existing records");
            }
        }

        sqlx::query("UPDATE children SET status = $2 WHERE id = $1")
            .bind(child_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }
}
