//! Per-subject staff and relation sub-records.
//!
//! Both are keyed by the subject id they belong to and carry the subject's
//! catalog surrogate id as a foreign reference.

use serde::{Deserialize, Serialize};

use super::{Images, RecordKind, RemapTable};

/// A person credited on a subject (`GET subjects/{id}/persons`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: u64,
    pub name: String,
    pub relation: String,
    pub career: Vec<String>,
    #[serde(rename = "type")]
    pub kind: u8,
    pub eps: String,
    pub images: Option<Images>,
}

/// A subject related to another subject (`GET subjects/{id}/subjects`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedSubject {
    pub id: u64,
    pub name: String,
    pub name_cn: String,
    pub relation: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub images: Option<Images>,
}

/// Staff list of one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectStaff {
    /// Subject id (natural key)
    pub id: u64,
    /// Catalog surrogate id of the subject
    #[serde(default)]
    pub subject_project_id: u64,
    #[serde(default)]
    pub persons: Vec<Person>,
}

/// Related subjects of one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRelations {
    /// Subject id (natural key)
    pub id: u64,
    /// Catalog surrogate id of the subject
    #[serde(default)]
    pub subject_project_id: u64,
    #[serde(default)]
    pub relations: Vec<RelatedSubject>,
}

fn resolve_subject(subject_id: u64, catalog: &RemapTable) -> Result<u64, String> {
    catalog
        .get(subject_id)
        .ok_or_else(|| format!("subject {subject_id} is not in the catalog"))
}

/// Descriptor for staff sub-records.
#[derive(Debug, Clone, Default)]
pub struct StaffKind;

impl RecordKind for StaffKind {
    type Record = SubjectStaff;

    fn dataset(&self) -> &'static str {
        "subject_persons"
    }

    fn key_column(&self) -> &'static str {
        "original_id"
    }

    fn natural_key(&self, record: &SubjectStaff) -> u64 {
        record.id
    }

    fn resolve(&self, record: &mut SubjectStaff, catalog: &RemapTable) -> Result<(), String> {
        record.subject_project_id = resolve_subject(record.id, catalog)?;
        Ok(())
    }

    fn depends_on_catalog(&self) -> bool {
        true
    }
}

/// Descriptor for relation sub-records.
#[derive(Debug, Clone, Default)]
pub struct RelationsKind;

impl RecordKind for RelationsKind {
    type Record = SubjectRelations;

    fn dataset(&self) -> &'static str {
        "subject_relations"
    }

    fn key_column(&self) -> &'static str {
        "original_id"
    }

    fn natural_key(&self, record: &SubjectRelations) -> u64 {
        record.id
    }

    fn resolve(&self, record: &mut SubjectRelations, catalog: &RemapTable) -> Result<(), String> {
        record.subject_project_id = resolve_subject(record.id, catalog)?;
        Ok(())
    }

    fn depends_on_catalog(&self) -> bool {
        true
    }
}
