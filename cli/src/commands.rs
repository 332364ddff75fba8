use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use vaccination_db::{run_migrations, DbConfig, PgStore, MIGRATIONS_DIR};
use vaccination_engine::age::start_of_day;
use vaccination_engine::{
    compute, BucketRecord, CalendarEntry, CalendarRepository, CalendarSnapshot, Child,
    ComplianceStatus, DoseCollision, Gender, RebuildEngine, RebuildOptions,
};

use crate::{Cli, Command, DatabaseArgs};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Migrate { dir } => migrate(&cli.database, dir).await,
        Command::Rebuild {
            child, concurrency, ..
        } => rebuild(&cli.database, child, concurrency).await,
        Command::Validate { calendar } => validate(&cli.database, calendar).await,
        Command::Preview {
            calendar,
            birth_date,
            gender,
            as_of,
        } => {
            let entries = load_calendar_file(&calendar)?;
            let now = as_of.map_or_else(Utc::now, start_of_day);
            let report = build_preview(&entries, birth_date, gender.into(), now);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn db_config(args: &DatabaseArgs) -> anyhow::Result<DbConfig<'static>> {
    let mut config = DbConfig::from_env()?;
    if let Some(url) = &args.database_url {
        config = config.with_url(url.clone());
    }
    if let Some(max) = args.max_connections {
        config = config.with_max_connections(max);
    }
    Ok(config)
}

async fn connect(args: &DatabaseArgs) -> anyhow::Result<PgStore> {
    let pool = db_config(args)?
        .connect()
        .await
        .context("Failed to connect to database")?;
    tracing::info!("✓ Database connected successfully");
    Ok(PgStore::new(pool))
}

async fn migrate(args: &DatabaseArgs, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let store = connect(args).await?;
    let dir = dir.unwrap_or_else(|| PathBuf::from(MIGRATIONS_DIR));
    let applied = run_migrations(store.pool(), &dir).await?;

    tracing::info!(applied = applied.len(), "migrations complete");
    Ok(())
}

/// 0 means one task per CPU
pub fn resolve_concurrency(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

async fn rebuild(
    args: &DatabaseArgs,
    child: Option<Uuid>,
    concurrency: usize,
) -> anyhow::Result<()> {
    let options = RebuildOptions::default().with_concurrency(resolve_concurrency(concurrency));
    let engine = RebuildEngine::new(Arc::new(connect(args).await?)).with_options(options);

    match child {
        Some(child_id) => match engine.rebuild_one(child_id).await? {
            Some(status) => println!("{child_id} {status}"),
            None => tracing::warn!(%child_id, "child not found"),
        },
        None => {
            let report = engine.rebuild_all().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn validate(args: &DatabaseArgs, calendar: Option<PathBuf>) -> anyhow::Result<()> {
    let entries = match calendar {
        Some(path) => load_calendar_file(&path)?,
        None => connect(args).await?.list_entries().await?,
    };

    let snapshot = CalendarSnapshot::build(&entries);
    println!("{}", serde_json::to_string_pretty(snapshot.collisions())?);

    if !snapshot.collisions().is_empty() {
        anyhow::bail!(
            "{} dose definition(s) are overridden by a later calendar entry",
            snapshot.collisions().len()
        );
    }
    Ok(())
}

pub fn load_calendar_file(path: &Path) -> anyhow::Result<Vec<CalendarEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calendar {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid calendar {}", path.display()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub status: ComplianceStatus,
    pub due: Vec<BucketRecord>,
    pub late: Vec<BucketRecord>,
    pub collisions: Vec<DoseCollision>,
}

/// Buckets of a child without any recorded dose
pub fn build_preview(
    entries: &[CalendarEntry],
    birth_date: NaiveDate,
    gender: Gender,
    now: DateTime<Utc>,
) -> PreviewReport {
    let snapshot = CalendarSnapshot::build(entries);
    let child = Child::new(Uuid::nil(), birth_date, gender);
    let rebuild = compute(&snapshot, &child, &[], now);

    PreviewReport {
        status: rebuild.status,
        due: rebuild.due().cloned().collect(),
        late: rebuild.late().cloned().collect(),
        collisions: snapshot.collisions().to_vec(),
    }
}
