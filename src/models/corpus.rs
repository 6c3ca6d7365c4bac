//! Persisted corpus of records for one dataset.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::RecordKind;

/// A record as stored on disk, augmented with its surrogate id.
///
/// The record's own fields are flattened next to `project_id`, so a stored
/// catalog entry reads `{"project_id": 7, "id": 1234, "name": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry<R> {
    /// Locally assigned dense sequence number, starting at 1.
    pub project_id: u64,

    #[serde(flatten)]
    pub record: R,
}

/// In-memory corpus of one record kind, indexed by natural key.
///
/// Only the orchestrator's single consumer mutates a corpus; see
/// `pipeline::merge` for the reconciliation operations.
#[derive(Debug, Clone)]
pub struct Corpus<K: RecordKind> {
    pub(crate) kind: Arc<K>,
    pub(crate) entries: Vec<CorpusEntry<K::Record>>,
    pub(crate) index: HashMap<u64, usize>,
}

impl<K: RecordKind> Corpus<K> {
    /// Create an empty corpus.
    pub fn new(kind: Arc<K>) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a corpus from stored entries.
    ///
    /// Fails if two entries share a natural key, since merge-by-key would be
    /// ambiguous.
    pub fn from_entries(
        kind: Arc<K>,
        entries: Vec<CorpusEntry<K::Record>>,
    ) -> std::result::Result<Self, String> {
        let mut corpus = Self {
            kind,
            entries,
            index: HashMap::new(),
        };
        corpus.rebuild_index()?;

        let mut seen = HashSet::new();
        let clashes = corpus
            .entries
            .iter()
            .filter(|entry| entry.project_id == 0 || !seen.insert(entry.project_id))
            .count();
        if clashes > 0 {
            log::warn!(
                "{}: {} entries have a zero or repeated project_id; run a renumber pass",
                corpus.kind.dataset(),
                clashes
            );
        }

        Ok(corpus)
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Shared handle to the kind descriptor.
    pub fn kind_arc(&self) -> Arc<K> {
        Arc::clone(&self.kind)
    }

    pub fn entries(&self) -> &[CorpusEntry<K::Record>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by natural key.
    pub fn get(&self, natural_key: u64) -> Option<&CorpusEntry<K::Record>> {
        self.index.get(&natural_key).map(|&pos| &self.entries[pos])
    }

    /// All natural keys, in corpus order.
    pub fn keys(&self) -> Vec<u64> {
        self.entries
            .iter()
            .map(|entry| self.kind.natural_key(&entry.record))
            .collect()
    }

    /// Largest surrogate id currently assigned (0 for an empty corpus).
    pub fn max_project_id(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.project_id)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn rebuild_index(&mut self) -> std::result::Result<(), String> {
        self.index.clear();
        for (pos, entry) in self.entries.iter().enumerate() {
            let key = self.kind.natural_key(&entry.record);
            if self.index.insert(key, pos).is_some() {
                return Err(format!("natural key {key} appears more than once"));
            }
        }
        Ok(())
    }
}
