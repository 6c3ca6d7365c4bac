//! Natural key → surrogate id projection.

use std::collections::BTreeMap;

use super::{Corpus, RecordKind};

/// Read-only lookup from natural key to surrogate id.
///
/// Built once from a corpus and shared by reference (usually behind an
/// `Arc`) with every stage that resolves foreign references. It is never
/// patched: callers rebuild it from the corpus after mutating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    by_key: BTreeMap<u64, u64>,
}

impl RemapTable {
    /// Project the current surrogate ids of a corpus.
    pub fn project<K: RecordKind>(corpus: &Corpus<K>) -> Self {
        corpus
            .entries()
            .iter()
            .map(|entry| (corpus.kind().natural_key(&entry.record), entry.project_id))
            .collect()
    }

    /// Surrogate id assigned to `natural_key`, if present.
    pub fn get(&self, natural_key: u64) -> Option<u64> {
        self.by_key.get(&natural_key).copied()
    }

    pub fn contains(&self, natural_key: u64) -> bool {
        self.by_key.contains_key(&natural_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Rows as `(surrogate_id, natural_key)`, ordered by natural key.
    pub fn rows(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.by_key.iter().map(|(key, id)| (*id, *key))
    }
}

impl FromIterator<(u64, u64)> for RemapTable {
    /// Build from `(natural_key, surrogate_id)` pairs.
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        Self {
            by_key: iter.into_iter().collect(),
        }
    }
}
