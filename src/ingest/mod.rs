// Ingestion pipeline module
// Reads course documents, embeds their text and fills the vector index


use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::extract::extract_text;
use crate::index::{IndexEntry, Metadata, VectorIndex};
use crate::providers::Embedder;
use crate::{RagError, Result};

/// A named document waiting to be ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    #[inline]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Debug)]
pub struct IngestFailure {
    pub filename: String,
    pub error: RagError,
}

/// Outcome of one ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Newly embedded or replaced documents
    pub indexed: Vec<String>,
    /// Documents already present with identical text
    pub unchanged: Vec<String>,
    /// Files whose extension is not ingested
    pub skipped: Vec<String>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// Documents present in the index after the run
    #[inline]
    pub fn total_indexed(&self) -> usize {
        self.indexed.len() + self.unchanged.len()
    }

    #[inline]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

enum Outcome {
    Indexed,
    Unchanged,
}

/// Extract → embed → upsert for each accepted document.
///
/// Documents are independent: a failure is recorded in the report and the
/// run moves on to the next one.
pub struct Ingestor<'a> {
    embedder: &'a dyn Embedder,
    extensions: Vec<String>,
}

impl<'a> Ingestor<'a> {
    #[inline]
    pub fn new<S: AsRef<str>>(embedder: &'a dyn Embedder, extensions: &[S]) -> Self {
        Self {
            embedder,
            extensions: extensions
                .iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    #[inline]
    pub fn from_config(embedder: &'a dyn Embedder, config: &IngestConfig) -> Self {
        Self::new(embedder, &config.extensions)
    }

    /// Whether `filename` has one of the ingested extensions
    #[inline]
    pub fn accepts(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(ext))
            })
    }

    /// Ingest an in-memory set of documents, in the order given
    #[inline]
    pub async fn ingest<I>(&self, index: &mut VectorIndex, documents: I) -> IngestReport
    where
        I: IntoIterator<Item = SourceDocument>,
    {
        let mut report = IngestReport::default();

        for document in documents {
            if !self.accepts(&document.filename) {
                debug!("Skipping {} (extension not ingested)", document.filename);
                report.skipped.push(document.filename);
                continue;
            }
            self.ingest_document(index, &document, &mut report).await;
        }

        log_report(&report);
        report
    }

    /// Ingest every accepted file directly inside `dir`, in file-name order.
    ///
    /// A missing directory, or one without any accepted file, is a setup error
    /// and the index is not touched.
    #[inline]
    pub async fn ingest_dir(&self, index: &mut VectorIndex, dir: &Path) -> Result<IngestReport> {
        let (files, skipped) = self.scan_dir(dir).await?;
        if files.is_empty() {
            return Err(RagError::Setup(format!(
                "No documents with extensions [{}] found in {}",
                self.extensions.join(", "),
                dir.display()
            )));
        }
        info!("Ingesting {} documents from {}", files.len(), dir.display());

        let bar = if console::user_attended_stderr() {
            ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(files.len() as u64);

        let mut report = IngestReport {
            skipped,
            ..IngestReport::default()
        };

        for path in files {
            let filename = file_name(&path);
            bar.set_message(filename.clone());

            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let document = SourceDocument::new(filename, bytes);
                    self.ingest_document(index, &document, &mut report).await;
                }
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    report.failures.push(IngestFailure {
                        filename,
                        error: RagError::Io(e),
                    });
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        log_report(&report);
        Ok(report)
    }

    async fn scan_dir(&self, dir: &Path) -> Result<(Vec<PathBuf>, Vec<String>)> {
        if !dir.is_dir() {
            return Err(RagError::Setup(format!(
                "Document directory not found: {}",
                dir.display()
            )));
        }

        let mut read_dir = tokio::fs::read_dir(dir).await.map_err(|e| {
            RagError::Setup(format!("Cannot read document directory {}: {}", dir.display(), e))
        })?;

        let mut files = Vec::new();
        let mut skipped = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    skipped.push(file_name(&path));
                    continue;
                }
            }
            let filename = file_name(&path);
            if self.accepts(&filename) {
                files.push(path);
            } else {
                debug!("Skipping {} (extension not ingested)", filename);
                skipped.push(filename);
            }
        }

        files.sort();
        skipped.sort();
        Ok((files, skipped))
    }

    async fn ingest_document(
        &self,
        index: &mut VectorIndex,
        document: &SourceDocument,
        report: &mut IngestReport,
    ) {
        match self.process(index, document).await {
            Ok(Outcome::Indexed) => report.indexed.push(document.filename.clone()),
            Ok(Outcome::Unchanged) => report.unchanged.push(document.filename.clone()),
            Err(e) => {
                error!("Failed to ingest {}: {}", document.filename, e);
                report.failures.push(IngestFailure {
                    filename: document.filename.clone(),
                    error: e,
                });
            }
        }
    }

    async fn process(&self, index: &mut VectorIndex, document: &SourceDocument) -> Result<Outcome> {
        let extracted = extract_text(&document.filename, &document.bytes)?;

        if index
            .get(&document.filename)
            .is_some_and(|existing| existing.raw_text == extracted.text)
        {
            debug!("{} is unchanged, skipping embedding", document.filename);
            return Ok(Outcome::Unchanged);
        }

        let embedding = self.embedder.embed(&extracted.text)?;

        let mut metadata = Metadata::new();
        metadata.insert("filename".to_string(), document.filename.clone());
        metadata.insert("bytes".to_string(), document.bytes.len().to_string());
        if let Some(pages) = extracted.pages {
            metadata.insert("pages".to_string(), pages.to_string());
        }

        index
            .upsert(IndexEntry::new(
                document.filename.clone(),
                extracted.text,
                metadata,
                embedding,
            ))
            .await?;

        info!("Indexed {}", document.filename);
        Ok(Outcome::Indexed)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn log_report(report: &IngestReport) {
    info!(
        "Ingestion finished: {} indexed, {} unchanged, {} failed, {} skipped",
        report.indexed.len(),
        report.unchanged.len(),
        report.failures.len(),
        report.skipped.len()
    );
    if report.has_failures() {
        warn!(
            "Failed documents: {}",
            itertools::join(report.failures.iter().map(|f| f.filename.as_str()), ", ")
        );
    }
}
