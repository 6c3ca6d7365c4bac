// src/models/mod.rs

//! Domain models for the harvester.
//!
//! Records of every dataset, the persisted corpus that holds them, the
//! remap table projected from a corpus, and the application configuration.

mod account;
mod config;
mod corpus;
mod kind;
mod remap;
mod staff;
mod subject;

// Re-export all public types
pub use account::{Account, AccountKind, CollectedSubject, CollectionType, UserCollection};
pub use config::{ApiConfig, Config, HarvestConfig, MAX_ATTEMPTS, PathsConfig, RetryConfig};
pub use corpus::{Corpus, CorpusEntry};
pub use kind::RecordKind;
pub use remap::RemapTable;
pub use staff::{Person, RelatedSubject, RelationsKind, StaffKind, SubjectRelations, SubjectStaff};
pub use subject::{CollectionCounts, Images, InfoboxItem, Rating, Subject, SubjectKind, Tag};
