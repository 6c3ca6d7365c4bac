//! Catalog entry (subject) data structures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RecordKind;

/// Cover image URLs in several sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub large: String,
    pub common: String,
    pub medium: String,
    pub small: String,
    pub grid: String,
}

/// One key/value line of the subject infobox. Values are either strings or
/// lists of `{k, v}` objects, so they are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoboxItem {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Rating summary. `count` maps score buckets ("1".."10") to vote counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rating {
    pub rank: u32,
    pub total: u64,
    pub score: f64,
    pub count: BTreeMap<String, u64>,
}

/// How many accounts hold the subject in each collection state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionCounts {
    pub wish: u64,
    pub collect: u64,
    pub doing: u64,
    pub on_hold: u64,
    pub dropped: u64,
}

/// User-applied tag with its vote count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub name: String,
    pub count: u64,
    pub total_cont: u64,
}

/// A catalog entry as returned by `GET subjects/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    /// Remote subject id (natural key)
    pub id: u64,

    /// Subject type (2 = anime)
    #[serde(rename = "type")]
    pub kind: u8,

    pub name: String,
    pub name_cn: String,
    pub summary: String,
    pub date: Option<String>,
    pub platform: String,
    pub images: Option<Images>,
    pub infobox: Vec<InfoboxItem>,
    pub rating: Rating,
    pub collection: CollectionCounts,
    pub tags: Vec<Tag>,
    pub meta_tags: Vec<String>,
    pub eps: u32,
    pub total_episodes: u32,
    pub volumes: u32,
    pub series: bool,
    pub locked: bool,
    pub nsfw: bool,
}

/// Descriptor for catalog entries.
#[derive(Debug, Clone)]
pub struct SubjectKind {
    /// Only subjects of this type are accepted.
    pub subject_type: u8,
}

impl SubjectKind {
    pub fn new(subject_type: u8) -> Self {
        Self { subject_type }
    }
}

impl RecordKind for SubjectKind {
    type Record = Subject;

    fn dataset(&self) -> &'static str {
        "anime"
    }

    fn key_column(&self) -> &'static str {
        "original_id"
    }

    fn natural_key(&self, record: &Subject) -> u64 {
        record.id
    }

    fn check(&self, record: &Subject) -> Result<(), String> {
        if record.kind != self.subject_type {
            return Err(format!("type {} is not {}", record.kind, self.subject_type));
        }
        if record.rating.rank == 0 {
            return Err("subject has no rank".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_api_payload_and_ignores_unknown_fields() {
        let json = r#"{
            "id": 8,
            "type": 2,
            "name": "コードギアス 反逆のルルーシュR2",
            "name_cn": "Code Geass 反叛的鲁路修R2",
            "date": "2008-04-06",
            "platform": "TV",
            "infobox": [{"key": "话数", "value": "25"}],
            "rating": {"rank": 85, "total": 100, "score": 8.2, "count": {"1": 3, "10": 40}},
            "collection": {"wish": 1, "collect": 2, "doing": 3, "on_hold": 4, "dropped": 5},
            "tags": [{"name": "SUNRISE", "count": 10}],
            "eps": 25,
            "total_episodes": 25,
            "unexpected": true
        }"#;

        let subject: Subject = serde_json::from_str(json).unwrap();
        assert_eq!(subject.id, 8);
        assert_eq!(subject.kind, 2);
        assert_eq!(subject.rating.rank, 85);
        assert_eq!(subject.rating.count.get("10"), Some(&40));
        assert_eq!(subject.tags[0].total_cont, 0);
        assert!(subject.images.is_none());
    }

    #[test]
    fn policy_requires_type_and_rank() {
        let kind = SubjectKind::new(2);
        let mut subject = Subject {
            id: 1,
            kind: 2,
            ..Subject::default()
        };
        assert!(kind.check(&subject).is_err());

        subject.rating.rank = 10;
        assert!(kind.check(&subject).is_ok());

        subject.kind = 1;
        assert!(kind.check(&subject).is_err());
    }
}
