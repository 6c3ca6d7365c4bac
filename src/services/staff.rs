//! Per-subject staff and relation sources.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ApiClient, FetchError, UnitSource};
use crate::models::{
    Person, RelatedSubject, RelationsKind, StaffKind, SubjectRelations, SubjectStaff,
};

/// `GET subjects/{id}/persons`
pub struct StaffSource {
    api: Arc<ApiClient>,
}

impl StaffSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UnitSource for StaffSource {
    type Kind = StaffKind;
    type Unit = u64;

    fn requested_key(&self, unit: &u64) -> Option<u64> {
        Some(*unit)
    }

    async fn fetch(&self, unit: &u64) -> Result<Vec<SubjectStaff>, FetchError> {
        let url = self.api.endpoint(&format!("subjects/{unit}/persons"), &[])?;
        let persons: Vec<Person> = self.api.get_json(&url).await?;
        Ok(vec![SubjectStaff {
            id: *unit,
            subject_project_id: 0,
            persons,
        }])
    }
}

/// `GET subjects/{id}/subjects`
pub struct RelationsSource {
    api: Arc<ApiClient>,
}

impl RelationsSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UnitSource for RelationsSource {
    type Kind = RelationsKind;
    type Unit = u64;

    fn requested_key(&self, unit: &u64) -> Option<u64> {
        Some(*unit)
    }

    async fn fetch(&self, unit: &u64) -> Result<Vec<SubjectRelations>, FetchError> {
        let url = self.api.endpoint(&format!("subjects/{unit}/subjects"), &[])?;
        let relations: Vec<RelatedSubject> = self.api.get_json(&url).await?;
        Ok(vec![SubjectRelations {
            id: *unit,
            subject_project_id: 0,
            relations,
        }])
    }
}
