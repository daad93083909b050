use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{NewStoredEntry, StoredEntry};
use crate::database::sqlite::queries::EntryQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database file, creating it when absent, and apply migrations
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `path`, creating its parent directory first
    #[inline]
    pub async fn initialize_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }

        Self::new(path).await
    }

    // Entry operations
    #[inline]
    pub async fn upsert_entry(&self, entry: &NewStoredEntry) -> Result<()> {
        EntryQueries::upsert(&self.pool, entry).await
    }

    #[inline]
    pub async fn list_entries(&self) -> Result<Vec<StoredEntry>> {
        EntryQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn get_entry(&self, id: &str) -> Result<Option<StoredEntry>> {
        EntryQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn count_entries(&self) -> Result<i64> {
        EntryQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn delete_all_entries(&self) -> Result<u64> {
        EntryQueries::delete_all(&self.pool).await
    }

    /// Reclaim space after a rebuild by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
