//! PostgreSQL storage for the vaccination rebuild engine.

pub mod config;
pub mod migrations;
pub mod repository;
pub mod rows;

pub use config::{ConfigError, DbConfig};
pub use migrations::{run_migrations, MigrationError, MIGRATIONS_DIR};
pub use repository::PgStore;
