// src/services/subjects.rs

//! Catalog sources: subjects by id and subjects by air month.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ApiClient, FetchError, UnitSource};
use crate::models::{Subject, SubjectKind};
use crate::utils::Month;

/// Fetches one catalog entry per unit via `GET subjects/{id}`.
pub struct SubjectSource {
    api: Arc<ApiClient>,
}

impl SubjectSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UnitSource for SubjectSource {
    type Kind = SubjectKind;
    type Unit = u64;

    fn requested_key(&self, unit: &u64) -> Option<u64> {
        Some(*unit)
    }

    async fn fetch(&self, unit: &u64) -> Result<Vec<Subject>, FetchError> {
        let url = self.api.endpoint(&format!("subjects/{unit}"), &[])?;
        let subject: Subject = self.api.get_json(&url).await?;
        Ok(vec![subject])
    }
}

/// Fetches every subject of one type that aired in a month, via
/// `GET subjects?type=&sort=date&year=&month=` (paged).
pub struct MonthSource {
    api: Arc<ApiClient>,
    subject_type: u8,
}

impl MonthSource {
    pub fn new(api: Arc<ApiClient>, subject_type: u8) -> Self {
        Self { api, subject_type }
    }
}

#[async_trait]
impl UnitSource for MonthSource {
    type Kind = SubjectKind;
    type Unit = Month;

    fn requested_key(&self, _unit: &Month) -> Option<u64> {
        None
    }

    async fn fetch(&self, unit: &Month) -> Result<Vec<Subject>, FetchError> {
        let url = self.api.endpoint(
            "subjects",
            &[
                ("type", self.subject_type.to_string()),
                ("sort", "date".to_string()),
                ("year", unit.year.to_string()),
                ("month", unit.month.to_string()),
            ],
        )?;
        self.api.collect_pages(url).await
    }
}
