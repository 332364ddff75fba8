//! Runs against a live database: `DATABASE_URL=... cargo test -p vaccination-db -- --ignored`

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use vaccination_db::{run_migrations, DbConfig, PgStore, MIGRATIONS_DIR};
use vaccination_engine::{ChildRepository, ComplianceStatus, DoseState, RebuildEngine};

async fn setup_test_db() -> PgPool {
    let config = DbConfig::from_env().expect("invalid database configuration");
    let pool = config.connect().await.expect("Failed to connect to database");
    run_migrations(&pool, Path::new(MIGRATIONS_DIR))
        .await
        .expect("Failed to run migrations");
    pool
}

/// Calendar of one WEEKS 0..6 entry for a fresh universal vaccine
async fn seed_calendar(pool: &PgPool) -> (Uuid, Uuid) {
    let vaccine_id = Uuid::new_v4();
    let calendar_id = Uuid::new_v4();

    sqlx::query("INSERT INTO vaccines (id, name, doses_required) VALUES ($1, $2, 1)")
        .bind(vaccine_id)
        .bind(format!("test-{vaccine_id}"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO calendar_entries (id, position, age_unit, min_age, max_age)
         VALUES ($1, 0, 'WEEKS', 0, 6)",
    )
    .bind(calendar_id)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO calendar_doses (calendar_id, vaccine_id, dose_number) VALUES ($1, $2, 1)",
    )
    .bind(calendar_id)
    .bind(vaccine_id)
    .execute(pool)
    .await
    .unwrap();

    (vaccine_id, calendar_id)
}

async fn seed_child(pool: &PgPool, birth_date: NaiveDate) -> Uuid {
    let child_id = Uuid::new_v4();
    sqlx::query("INSERT INTO children (id, birth_date, gender) VALUES ($1, $2, 'F')")
        .bind(child_id)
        .bind(birth_date)
        .execute(pool)
        .await
        .unwrap();
    child_id
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_rebuild_writes_late_row_and_status() {
    let pool = setup_test_db().await;
    let (vaccine_id, calendar_id) = seed_calendar(&pool).await;
    let birth = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let child_id = seed_child(&pool, birth).await;
    let store = Arc::new(PgStore::new(pool.clone()));
    let engine = RebuildEngine::new(Arc::clone(&store));
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(70);

    let status = engine.rebuild_one_at(child_id, now).await.unwrap();
    assert_eq!(status, Some(ComplianceStatus::NotUpToDate));

    let profile = store.get(child_id).await.unwrap().unwrap();
    assert_eq!(profile.child.status, ComplianceStatus::NotUpToDate);
    let late = profile
        .records
        .iter()
        .find(|r| r.key.vaccine_id == vaccine_id && r.key.calendar_id == calendar_id)
        .unwrap();
    assert_eq!(late.state, DoseState::Late);
    assert_eq!(late.date, NaiveDate::from_ymd_opt(2024, 2, 12));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_rebuild_respects_completed_rows() {
    let pool = setup_test_db().await;
    let (vaccine_id, calendar_id) = seed_calendar(&pool).await;
    let child_id = seed_child(&pool, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).await;
    sqlx::query(
        "INSERT INTO dose_buckets (child_id, vaccine_id, calendar_id, dose, state)
         VALUES ($1, $2, $3, 1, 'completed')",
    )
    .bind(child_id)
    .bind(vaccine_id)
    .bind(calendar_id)
    .execute(&pool)
    .await
    .unwrap();

    let store = Arc::new(PgStore::new(pool.clone()));
    let engine = RebuildEngine::new(Arc::clone(&store));
    let now = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();
    engine.rebuild_one_at(child_id, now).await.unwrap();
    engine.rebuild_one_at(child_id, now).await.unwrap();

    let profile = store.get(child_id).await.unwrap().unwrap();
    let ours: Vec<_> = profile
        .records
        .iter()
        .filter(|r| r.key.vaccine_id == vaccine_id)
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].state, DoseState::Completed);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_child_is_a_no_op() {
    let pool = setup_test_db().await;
    let engine = RebuildEngine::new(Arc::new(PgStore::new(pool)));

    assert_eq!(engine.rebuild_one(Uuid::new_v4()).await.unwrap(), None);
}
