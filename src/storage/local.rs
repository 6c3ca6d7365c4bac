//! Local filesystem storage implementation.
//!
//! Corpora are JSON arrays of entries, read whole and rewritten whole.
//! Remap tables and skip logs are CSV.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Corpus, CorpusEntry, RecordKind, RemapTable};
use crate::storage::{CorpusStore, SkipRecord, WriteMetadata};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    pub fn corpus_key(dataset: &str) -> String {
        format!("{dataset}.json")
    }

    pub fn remap_key(dataset: &str) -> String {
        format!("{dataset}_remap.csv")
    }

    pub fn skip_log_key(dataset: &str) -> String {
        format!("logs/skipped_{dataset}.csv")
    }

    /// Absolute path of the corpus file of `dataset`.
    pub fn corpus_path(&self, dataset: &str) -> PathBuf {
        self.path(&Self::corpus_key(dataset))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// The temp file is removed again if any step fails.
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                log::debug!("could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::corpus(self.path(key), e)),
            None => Ok(None),
        }
    }

    /// Append bytes to a file, creating it if needed.
    async fn append_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<K: RecordKind> CorpusStore<K> for LocalStorage {
    async fn load_corpus(&self, kind: Arc<K>) -> Result<Corpus<K>> {
        let key = Self::corpus_key(kind.dataset());
        match self.read_json::<Vec<CorpusEntry<K::Record>>>(&key).await? {
            Some(entries) => {
                log::info!("Loaded {} {} entries", entries.len(), kind.dataset());
                Corpus::from_entries(kind, entries)
                    .map_err(|e| AppError::corpus(self.path(&key), e))
            }
            None => {
                log::info!("No {} corpus yet, starting empty", kind.dataset());
                Ok(Corpus::new(kind))
            }
        }
    }

    async fn save_corpus(&self, corpus: &Corpus<K>) -> Result<WriteMetadata> {
        let key = Self::corpus_key(corpus.kind().dataset());
        self.write_json(&key, corpus.entries()).await?;
        log::debug!("{} entries written to {}", corpus.len(), key);

        Ok(WriteMetadata {
            path: self.path(&key),
            entries: corpus.len(),
            timestamp: Utc::now(),
        })
    }

    async fn save_remap(&self, kind: &K, table: &RemapTable) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["project_id", kind.key_column()])?;
        for (project_id, natural_key) in table.rows() {
            writer.write_record([project_id.to_string(), natural_key.to_string()])?;
        }
        let bytes = writer.into_inner().map_err(|e| AppError::Io(e.into_error()))?;

        let key = Self::remap_key(kind.dataset());
        self.write_bytes(&key, &bytes).await?;
        log::info!("Remap table: {} rows written to {}", table.len(), key);
        Ok(())
    }

    async fn append_skips(&self, kind: &K, skips: &[SkipRecord]) -> Result<()> {
        if skips.is_empty() {
            return Ok(());
        }

        let key = Self::skip_log_key(kind.dataset());
        let has_header = self.path(&key).exists();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!has_header)
            .from_writer(Vec::new());
        for skip in skips {
            writer.serialize(skip)?;
        }
        let bytes = writer.into_inner().map_err(|e| AppError::Io(e.into_error()))?;

        self.append_bytes(&key, &bytes).await
    }
}
