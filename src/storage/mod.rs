//! Storage abstractions for corpus persistence.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── harvest.toml                  # Configuration
//! ├── anime.json                    # Catalog corpus
//! ├── anime_remap.csv               # project_id,original_id
//! ├── subject_persons.json          # Staff corpus (+ _remap.csv)
//! ├── subject_relations.json        # Relations corpus (+ _remap.csv)
//! ├── user.json                     # Account corpus
//! ├── user_remap.csv                # project_id,user_id
//! └── logs/
//!     └── skipped_{dataset}.csv     # timestamp,unit,key,reason
//! ```

pub mod local;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Corpus, RecordKind, RemapTable};

// Re-export for convenience
pub use local::LocalStorage;

/// Metadata about a corpus write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// File the corpus was written to
    pub path: PathBuf,
    /// Number of entries written
    pub entries: usize,
    /// Timestamp of the write
    pub timestamp: DateTime<Utc>,
}

/// One line of the skip log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub timestamp: DateTime<Utc>,
    /// Unit of work, e.g. `8` or `2024-04`
    pub unit: String,
    /// Natural key of the rejected record, when known
    pub key: Option<u64>,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(unit: impl Into<String>, key: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            unit: unit.into(),
            key,
            reason: reason.into(),
        }
    }
}

/// Trait for corpus storage backends.
///
/// Every write must be atomic: a reader sees either the previous file or
/// the new one, never a truncated document.
#[async_trait]
pub trait CorpusStore<K: RecordKind>: Send + Sync {
    /// Load the corpus of `kind`; a missing file is an empty corpus.
    async fn load_corpus(&self, kind: Arc<K>) -> Result<Corpus<K>>;

    /// Replace the persisted corpus.
    async fn save_corpus(&self, corpus: &Corpus<K>) -> Result<WriteMetadata>;

    /// Rewrite the remap table of `kind`.
    async fn save_remap(&self, kind: &K, table: &RemapTable) -> Result<()>;

    /// Append to the skip log of `kind`.
    async fn append_skips(&self, kind: &K, skips: &[SkipRecord]) -> Result<()>;
}
