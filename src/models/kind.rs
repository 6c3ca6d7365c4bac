//! Record-kind descriptor.
//!
//! Every dataset (catalog entries, staff, relations, account collections)
//! flows through the same fetch/filter/merge pipeline. The pieces that differ
//! per dataset are gathered here: how to read the natural key, which policy a
//! record must satisfy, how foreign references are resolved and which fields
//! a merge replaces.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

use super::RemapTable;

/// Describes one record kind to the generic pipeline.
pub trait RecordKind: Send + Sync + 'static {
    /// Payload persisted in the corpus (without the surrogate id).
    type Record: Serialize
        + DeserializeOwned
        + Clone
        + PartialEq
        + fmt::Debug
        + Send
        + Sync
        + 'static;

    /// Dataset name, used for file names and log lines.
    fn dataset(&self) -> &'static str;

    /// Header of the natural key column in the remap table.
    fn key_column(&self) -> &'static str;

    /// The remote system's immutable identifier for `record`.
    fn natural_key(&self, record: &Self::Record) -> u64;

    /// Kind-specific policy predicate. `Err` carries the rejection reason.
    fn check(&self, _record: &Self::Record) -> Result<(), String> {
        Ok(())
    }

    /// Resolve foreign surrogate references against the catalog remap table.
    ///
    /// Unresolvable nested entries are pruned in place. `Err` means the whole
    /// record refers to something missing and must be dropped.
    fn resolve(&self, _record: &mut Self::Record, _catalog: &RemapTable) -> Result<(), String> {
        Ok(())
    }

    /// Whether records of this kind carry references into the catalog.
    fn depends_on_catalog(&self) -> bool {
        false
    }

    /// Apply a freshly fetched record onto an existing one (full replacement).
    fn merge(&self, existing: &mut Self::Record, fresh: Self::Record) {
        *existing = fresh;
    }

    /// Whether a record holds no payload worth keeping (maintenance pruning).
    fn is_empty(&self, _record: &Self::Record) -> bool {
        false
    }
}
