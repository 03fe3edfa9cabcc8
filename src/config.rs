//! Configuration management

use anyhow::{Context, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string; only the database commands need it
    pub database_url: Option<String>,

    /// Maximum pool size
    pub db_max_connections: u32,

    /// Directory of the daily rolling log file
    pub logs_dir: String,

    /// Encoding used when `--encoding` is not given
    pub default_encoding: String,

    /// Link occupied spaces to tenants without `--link-tenants`
    pub link_tenants: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Result<Self> {
        let database_url = var("DATABASE_URL").filter(|v| !v.is_empty());

        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive number, got '{}'", raw))?,
            None => 5,
        };

        let logs_dir = var("LOGS_DIR").unwrap_or_else(|| "logs".to_string());

        let default_encoding = var("IMPORT_ENCODING").unwrap_or_else(|| "utf-8".to_string());

        let link_tenants = var("IMPORT_LINK_TENANTS")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            db_max_connections,
            logs_dir,
            default_encoding,
            link_tenants,
        })
    }

    /// Connection string for commands that touch the database
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}
