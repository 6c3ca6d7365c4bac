// src/pipeline/filter.rs

//! Deduplication and validation of one unit's raw records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::models::{RecordKind, RemapTable};

/// Why a fetched record was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The API answered with a different record than the one requested
    KeyMismatch { requested: u64 },
    /// Kind-specific policy predicate failed
    Policy(String),
    /// The record refers to something absent from the catalog
    Dangling(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::KeyMismatch { requested } => {
                write!(f, "key mismatch (requested {requested})")
            }
            RejectReason::Policy(reason) => write!(f, "policy: {reason}"),
            RejectReason::Dangling(reason) => write!(f, "dangling: {reason}"),
        }
    }
}

/// A discarded record, by natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub key: u64,
    pub reason: RejectReason,
}

/// Records that passed the filter, plus what was discarded.
#[derive(Debug)]
pub struct Filtered<R> {
    pub records: Vec<R>,
    pub rejected: Vec<Rejection>,
}

/// Applies key matching, the kind policy, catalog resolution and in-unit
/// deduplication, in that order.
pub struct Filter<K: RecordKind> {
    kind: Arc<K>,
    catalog: Option<Arc<RemapTable>>,
}

impl<K: RecordKind> Filter<K> {
    pub fn new(kind: Arc<K>) -> Self {
        Self {
            kind,
            catalog: None,
        }
    }

    /// Catalog snapshot used to resolve foreign references.
    pub fn with_catalog(mut self, catalog: Arc<RemapTable>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Filter the raw records of one unit.
    ///
    /// When several records share a natural key the later one wins; it
    /// takes the position of the first.
    pub fn apply(&self, requested: Option<u64>, records: Vec<K::Record>) -> Filtered<K::Record> {
        let empty = RemapTable::default();
        let catalog = self.catalog.as_deref().unwrap_or(&empty);
        let dataset = self.kind.dataset();

        let mut kept: Vec<K::Record> = Vec::with_capacity(records.len());
        let mut positions: HashMap<u64, usize> = HashMap::new();
        let mut rejected = Vec::new();

        for mut record in records {
            let key = self.kind.natural_key(&record);

            if let Some(requested) = requested.filter(|&requested| requested != key) {
                log::warn!(
                    "{dataset}: requested {requested} but received {key}, treated as missing"
                );
                rejected.push(Rejection {
                    key,
                    reason: RejectReason::KeyMismatch { requested },
                });
                continue;
            }

            if let Err(reason) = self.kind.check(&record) {
                log::debug!("{dataset}: {key} rejected: {reason}");
                rejected.push(Rejection {
                    key,
                    reason: RejectReason::Policy(reason),
                });
                continue;
            }

            if self.kind.depends_on_catalog() {
                if let Err(reason) = self.kind.resolve(&mut record, catalog) {
                    log::info!("{dataset}: {key} dropped: {reason}");
                    rejected.push(Rejection {
                        key,
                        reason: RejectReason::Dangling(reason),
                    });
                    continue;
                }
            }

            match positions.get(&key) {
                Some(&pos) => kept[pos] = record,
                None => {
                    positions.insert(key, kept.len());
                    kept.push(record);
                }
            }
        }

        Filtered {
            records: kept,
            rejected,
        }
    }
}
