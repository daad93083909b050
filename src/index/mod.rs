// Vector index module
// Nearest-neighbour search over document embeddings, held in memory and
// optionally written through to SQLite

pub mod distance;


use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{Config, StorageMode};
use crate::database::Database;
use crate::database::models::{NewStoredEntry, StoredEntry, encode_vector};
use crate::providers::Embedding;
use crate::{RagError, Result};

pub use distance::DistanceMetric;

/// Source metadata attached to an entry, e.g. `filename` and `pages`
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub raw_text: String,
    pub metadata: Metadata,
    pub embedding: Embedding,
    pub indexed_at: DateTime<Utc>,
}

impl IndexEntry {
    #[inline]
    pub fn new(
        id: impl Into<String>,
        raw_text: impl Into<String>,
        metadata: Metadata,
        embedding: Embedding,
    ) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
            metadata,
            embedding,
            indexed_at: Utc::now(),
        }
    }

    fn to_stored(&self) -> Result<NewStoredEntry> {
        let metadata = serde_json::to_string(&self.metadata)
            .map_err(|e| RagError::Database(format!("Failed to encode metadata: {}", e)))?;
        let dimension = i64::try_from(self.embedding.len())
            .map_err(|e| RagError::Database(format!("Embedding too large to store: {}", e)))?;

        Ok(NewStoredEntry {
            id: self.id.clone(),
            raw_text: self.raw_text.clone(),
            metadata,
            vector: encode_vector(&self.embedding),
            dimension,
            indexed_at: self.indexed_at.naive_utc(),
        })
    }

    fn from_stored(stored: StoredEntry) -> Result<Self> {
        let embedding = stored.decode_vector().ok_or_else(|| {
            RagError::Database(format!("Stored vector for {} is corrupt", stored.id))
        })?;
        let metadata: Metadata = serde_json::from_str(&stored.metadata).map_err(|e| {
            RagError::Database(format!("Stored metadata for {} is corrupt: {}", stored.id, e))
        })?;

        Ok(Self {
            id: stored.id,
            raw_text: stored.raw_text,
            metadata,
            embedding,
            indexed_at: stored.indexed_at.and_utc(),
        })
    }
}

/// A query hit: the entry and its distance to the query, lower is closer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub distance: f32,
}

/// Exhaustive nearest-neighbour index.
///
/// Entries are kept in insertion order; every entry has the same
/// dimensionality, fixed by the first one inserted. A durable index writes
/// each change to SQLite before applying it in memory.
#[derive(Debug)]
pub struct VectorIndex {
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    store: Option<Database>,
}

impl VectorIndex {
    /// An index that lives for the duration of the process
    #[inline]
    pub fn ephemeral(metric: DistanceMetric) -> Self {
        Self {
            metric,
            entries: Vec::new(),
            positions: HashMap::new(),
            store: None,
        }
    }

    /// Open or create the SQLite file at `path` and load its entries in insertion order
    #[inline]
    pub async fn open_durable(path: &Path, metric: DistanceMetric) -> Result<Self> {
        info!("Opening durable index at {}", path.display());

        let store = Database::initialize_at(path)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;
        let stored = store
            .list_entries()
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let mut index = Self::ephemeral(metric);
        for row in stored {
            let entry = IndexEntry::from_stored(row)?;
            index.check_dimension(entry.embedding.len())?;
            index.insert_in_memory(entry);
        }
        index.store = Some(store);

        info!(
            "Loaded {} entries from durable index ({} metric)",
            index.len(),
            metric
        );
        Ok(index)
    }

    /// Build the index the configuration asks for
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        match config.index.storage {
            StorageMode::Ephemeral => {
                debug!("Using ephemeral index ({} metric)", config.index.metric);
                Ok(Self::ephemeral(config.index.metric))
            }
            StorageMode::Durable => {
                Self::open_durable(&config.index_database_path(), config.index.metric).await
            }
        }
    }

    /// Insert `entry`, or replace the entry with the same id in its original position.
    ///
    /// Fails without changing the index when the embedding is empty or its
    /// dimensionality differs from the entries already held.
    #[inline]
    pub async fn upsert(&mut self, entry: IndexEntry) -> Result<()> {
        if entry.embedding.is_empty() {
            return Err(RagError::Embedding(format!(
                "Refusing to index {} with an empty embedding",
                entry.id
            )));
        }
        self.check_dimension(entry.embedding.len())?;

        if let Some(store) = &self.store {
            store
                .upsert_entry(&entry.to_stored()?)
                .await
                .map_err(|e| RagError::Database(format!("{:#}", e)))?;
        }

        debug!(
            "Indexed {} ({} characters, {} dimensions)",
            entry.id,
            entry.raw_text.len(),
            entry.embedding.len()
        );
        self.insert_in_memory(entry);
        Ok(())
    }

    /// Up to `k` entries closest to `embedding`, nearest first; equal distances
    /// keep insertion order
    #[inline]
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(embedding.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, self.metric.distance(embedding, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| ScoredEntry {
                entry: self.entries[position].clone(),
                distance,
            })
            .collect())
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.positions.get(id).map(|&position| &self.entries[position])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality shared by every entry, `None` while the index is empty
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|entry| entry.embedding.len())
    }

    /// Entry ids in insertion order
    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.id.as_str())
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    /// Drop every entry, including those in durable storage
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            self.entries.clear();
            self.positions.clear();
            return Ok(());
        };

        let removed = store
            .delete_all_entries()
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;
        self.entries.clear();
        self.positions.clear();
        info!("Removed {} entries from durable index", removed);

        // The table is already empty; a failed VACUUM only leaves the file larger
        if let Err(e) = store.optimize().await {
            warn!("Failed to compact durable index: {:#}", e);
        }
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension() {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn insert_in_memory(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}
