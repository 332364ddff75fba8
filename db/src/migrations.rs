use sqlx::postgres::PgPool;
use sqlx::Executor;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Migrations shipped with this crate
pub const MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations");

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migrations directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read migrations: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// `.sql` files of `dir` in the order they are applied
pub fn pending_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, MigrationError> {
    if !dir.exists() {
        return Err(MigrationError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files: Vec<(String, PathBuf)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "sql"))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((name, path))
        })
        .collect();

    // Sort by filename to ensure order
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Apply every migration of `dir` not applied yet, each in its own transaction.
///
/// Returns the names of the migrations applied by this call.
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<Vec<String>, MigrationError> {
    init_migrations_tracker(pool).await?;

    let mut applied = Vec::new();
    for (name, path) in pending_files(dir)? {
        if is_applied(pool, &name).await? {
            tracing::debug!(migration = %name, "already applied");
            continue;
        }

        let sql = fs::read_to_string(&path)?;
        let mut tx = pool.begin().await?;
        (&mut *tx)
            .execute(sql.as_str())
            .await
            .map_err(|source| MigrationError::Failed {
                name: name.clone(),
                source,
            })?;
        sqlx::query("INSERT INTO schema_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(migration = %name, "applied migration");
        applied.push(name);
    }

    Ok(applied)
}

/// Create the table tracking applied migrations
pub async fn init_migrations_tracker(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn is_applied(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
    let found: Option<i32> = sqlx::query_scalar("SELECT id FROM schema_migrations WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_files_are_sorted_sql_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002_b.sql", "0001_a.sql", "notes.md", "0010_c.sql"] {
            fs::write(dir.path().join(name), "SELECT 1;").unwrap();
        }

        let names: Vec<String> = pending_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(names, vec!["0001_a.sql", "0002_b.sql", "0010_c.sql"]);
    }

    #[test]
    fn test_missing_directory() {
        let result = pending_files(Path::new("/nonexistent/vaccination/migrations"));
        assert!(matches!(result, Err(MigrationError::MissingDirectory(_))));
    }

    #[test]
    fn test_bundled_migrations_exist() {
        let files = pending_files(Path::new(MIGRATIONS_DIR)).unwrap();
        assert!(!files.is_empty());
    }
}
