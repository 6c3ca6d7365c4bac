// src/pipeline/merge.rs

//! Reconciliation of fresh records against a corpus.
//!
//! Matching is by natural key. A match keeps its surrogate id and has its
//! payload replaced; an unmatched record gets `max + 1`. Renumbering and
//! pruning are explicit maintenance operations.

use std::collections::HashSet;

use crate::models::{Corpus, CorpusEntry, RecordKind, RemapTable};

/// Effect of merging one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted(u64),
    Updated(u64),
    /// Matched an entry whose payload was already identical
    Unchanged(u64),
}

impl<K: RecordKind> Corpus<K> {
    /// Merge one record by natural key.
    pub fn merge(&mut self, record: K::Record) -> MergeOutcome {
        let key = self.kind.natural_key(&record);

        if let Some(&pos) = self.index.get(&key) {
            let entry = &mut self.entries[pos];
            let mut merged = entry.record.clone();
            self.kind.merge(&mut merged, record);
            if merged == entry.record {
                return MergeOutcome::Unchanged(entry.project_id);
            }
            entry.record = merged;
            return MergeOutcome::Updated(entry.project_id);
        }

        let project_id = self.max_project_id() + 1;
        self.index.insert(key, self.entries.len());
        self.entries.push(CorpusEntry { project_id, record });
        MergeOutcome::Inserted(project_id)
    }

    /// Sort by natural key and reassign surrogate ids `1..=N`.
    ///
    /// Returns how many entries received a different id.
    pub fn renumber(&mut self) -> usize {
        let kind = self.kind_arc();
        self.entries.sort_by_key(|entry| kind.natural_key(&entry.record));

        let mut changed = 0;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let project_id = i as u64 + 1;
            if entry.project_id != project_id {
                entry.project_id = project_id;
                changed += 1;
            }
        }

        self.reindex();
        changed
    }

    /// Re-resolve every entry against a catalog snapshot.
    ///
    /// Entries that no longer resolve are removed; their natural keys are
    /// returned. Surrogate ids are left as they are.
    pub fn relink(&mut self, catalog: &RemapTable) -> Vec<u64> {
        let kind = self.kind_arc();
        let mut removed = Vec::new();

        self.entries.retain_mut(|entry| {
            match kind.resolve(&mut entry.record, catalog) {
                Ok(()) => true,
                Err(reason) => {
                    let key = kind.natural_key(&entry.record);
                    log::info!("{}: {} removed: {}", kind.dataset(), key, reason);
                    removed.push(key);
                    false
                }
            }
        });

        self.reindex();
        removed
    }

    /// Remove entries whose payload is empty. Returns their natural keys.
    pub fn prune_empty(&mut self) -> Vec<u64> {
        let kind = self.kind_arc();
        let mut removed = Vec::new();

        self.entries.retain(|entry| {
            if kind.is_empty(&entry.record) {
                removed.push(kind.natural_key(&entry.record));
                false
            } else {
                true
            }
        });

        self.reindex();
        removed
    }

    /// Natural keys of entries whose payload is empty.
    pub fn empty_keys(&self) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|entry| self.kind.is_empty(&entry.record))
            .map(|entry| self.kind.natural_key(&entry.record))
            .collect()
    }

    /// Whether surrogate ids are exactly `1..=N`.
    pub fn is_dense(&self) -> bool {
        let ids: HashSet<u64> = self.entries.iter().map(|entry| entry.project_id).collect();
        ids.len() == self.entries.len()
            && (1..=self.entries.len() as u64).all(|id| ids.contains(&id))
    }

    // Removing or reordering entries cannot introduce duplicate keys.
    fn reindex(&mut self) {
        if let Err(e) = self.rebuild_index() {
            log::error!("{}: {}", self.kind.dataset(), e);
        }
    }
}
