
use super::models::*;
use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::SqlitePool;
use tracing::debug;

pub struct EntryQueries;

impl EntryQueries {
    /// Insert a new entry or replace the content of an existing one.
    ///
    /// A replaced row keeps its `seq`, so load order is unchanged.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, entry: &NewStoredEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entries (id, raw_text, metadata, vector, dimension, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                raw_text = excluded.raw_text,
                metadata = excluded.metadata,
                vector = excluded.vector,
                dimension = excluded.dimension,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.raw_text)
        .bind(&entry.metadata)
        .bind(&entry.vector)
        .bind(entry.dimension)
        .bind(entry.indexed_at)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to store entry {}", entry.id))?;

        debug!("Stored entry {}", entry.id);
        Ok(())
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<StoredEntry>> {
        let mut rows = sqlx::query_as::<_, StoredEntry>(
            r#"
            SELECT seq, id, raw_text, metadata, vector, dimension, indexed_at
            FROM entries
            ORDER BY seq ASC
            "#,
        )
        .fetch(pool);

        let mut entries = Vec::new();
        while let Some(entry) = rows.try_next().await.context("Failed to read entries")? {
            entries.push(entry);
        }

        Ok(entries)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<StoredEntry>> {
        let result = sqlx::query_as::<_, StoredEntry>(
            r#"
            SELECT seq, id, raw_text, metadata, vector, dimension, indexed_at
            FROM entries WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get entry by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(pool)
            .await
            .context("Failed to count entries")
    }

    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entries")
            .execute(pool)
            .await
            .context("Failed to delete entries")?;

        Ok(result.rows_affected())
    }
}
