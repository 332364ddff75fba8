use sqlx::postgres::{PgPool, PgPoolOptions};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid DB_PORT: {0}")]
    InvalidPort(String),

    #[error("invalid DB_MAX_CONNECTIONS: {0}")]
    InvalidMaxConnections(String),
}

/// Database configuration with `Cow` for flexible string handling
#[derive(Debug, Clone)]
pub struct DbConfig<'a> {
    /// Full connection URL; takes precedence over the individual parts
    pub url: Option<Cow<'a, str>>,
    pub host: Cow<'a, str>,
    pub port: u16,
    pub database: Cow<'a, str>,
    pub user: Cow<'a, str>,
    pub password: Cow<'a, str>,
    pub max_connections: u32,
}

impl<'a> DbConfig<'a> {
    /// Create new database configuration
    pub fn new(
        host: impl Into<Cow<'a, str>>,
        port: u16,
        database: impl Into<Cow<'a, str>>,
        user: impl Into<Cow<'a, str>>,
        password: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self {
            url: None,
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            max_connections: 5,
        }
    }

    pub fn with_url(mut self, url: impl Into<Cow<'a, str>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set max connections
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// PostgreSQL connection string, borrowed when a URL was configured
    pub fn connection_string(&self) -> Cow<'_, str> {
        match &self.url {
            Some(url) => Cow::Borrowed(url.as_ref()),
            None => Cow::Owned(format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.database
            )),
        }
    }

    /// Read configuration from environment variables with fallback
    pub fn from_env() -> Result<DbConfig<'static>, ConfigError> {
        DbConfig::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] with an explicit variable source
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<DbConfig<'static>, ConfigError> {
        let host = lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match lookup("DB_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => 5432,
        };
        let database = lookup("DB_NAME").unwrap_or_else(|| "vaccination".to_string());
        let user = lookup("DB_USER").unwrap_or_else(|| "postgres".to_string());
        let password = lookup("DB_PASSWORD").unwrap_or_else(|| "postgres".to_string());

        let mut config = DbConfig::new(host, port, database, user, password);
        if let Some(url) = lookup("DATABASE_URL") {
            config = config.with_url(url);
        }
        if let Some(raw) = lookup("DB_MAX_CONNECTIONS") {
            let max = raw
                .parse()
                .map_err(|_| ConfigError::InvalidMaxConnections(raw))?;
            config = config.with_max_connections(max);
        }
        Ok(config)
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.connection_string())
            .await
    }
}

impl<'a> Default for DbConfig<'a> {
    fn default() -> Self {
        Self {
            url: None,
            host: Cow::Borrowed("localhost"),
            port: 5432,
            database: Cow::Borrowed("vaccination"),
            user: Cow::Borrowed("postgres"),
            password: Cow::Borrowed("postgres"),
            max_connections: 5,
        }
    }
}
