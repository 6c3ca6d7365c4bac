//! Per-account collection lists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RecordKind, RemapTable};

/// Collection state of a subject in an account, as numbered by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionType {
    Wish = 1,
    Collect = 2,
    Doing = 3,
    OnHold = 4,
    Dropped = 5,
}

impl CollectionType {
    pub const ALL: [CollectionType; 5] = [
        CollectionType::Wish,
        CollectionType::Collect,
        CollectionType::Doing,
        CollectionType::OnHold,
        CollectionType::Dropped,
    ];

    /// Numeric code used in the `type` query parameter.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            CollectionType::Wish => "wish",
            CollectionType::Collect => "collect",
            CollectionType::Doing => "doing",
            CollectionType::OnHold => "on_hold",
            CollectionType::Dropped => "dropped",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One item of `GET users/{id}/collections`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCollection {
    pub subject_id: u64,
    pub subject_type: u8,
    #[serde(rename = "type")]
    pub collection_type: u8,
    pub rate: u8,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub updated_at: String,
}

/// A collected subject as stored in the account corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectedSubject {
    pub subject_id: u64,
    /// Catalog surrogate id of the subject
    pub project_id: u64,
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub rate: u8,
    pub updated_at: String,
}

impl From<UserCollection> for CollectedSubject {
    fn from(item: UserCollection) -> Self {
        Self {
            subject_id: item.subject_id,
            project_id: 0,
            tags: item.tags,
            comment: item.comment,
            rate: item.rate,
            updated_at: item.updated_at,
        }
    }
}

/// All collection lists of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    /// Remote numeric account id (natural key)
    pub user_id: u64,
    /// Username, used in API paths when known
    pub name: Option<String>,
    pub wish: Vec<CollectedSubject>,
    pub collect: Vec<CollectedSubject>,
    pub doing: Vec<CollectedSubject>,
    pub on_hold: Vec<CollectedSubject>,
    pub dropped: Vec<CollectedSubject>,
}

impl Account {
    /// Build an account from the raw pages fetched for each collection type.
    ///
    /// Items are deduplicated by subject id within each type; the item seen
    /// last wins. Lists come out ordered by subject id.
    pub fn from_collections(
        user_id: u64,
        name: Option<String>,
        collections: Vec<(CollectionType, Vec<UserCollection>)>,
    ) -> Self {
        let mut account = Self {
            user_id,
            name,
            ..Self::default()
        };
        for (collection_type, items) in collections {
            let unique: BTreeMap<u64, UserCollection> = items
                .into_iter()
                .map(|item| (item.subject_id, item))
                .collect();
            *account.list_mut(collection_type) =
                unique.into_values().map(CollectedSubject::from).collect();
        }
        account
    }

    pub fn list(&self, collection_type: CollectionType) -> &[CollectedSubject] {
        match collection_type {
            CollectionType::Wish => &self.wish,
            CollectionType::Collect => &self.collect,
            CollectionType::Doing => &self.doing,
            CollectionType::OnHold => &self.on_hold,
            CollectionType::Dropped => &self.dropped,
        }
    }

    pub fn list_mut(&mut self, collection_type: CollectionType) -> &mut Vec<CollectedSubject> {
        match collection_type {
            CollectionType::Wish => &mut self.wish,
            CollectionType::Collect => &mut self.collect,
            CollectionType::Doing => &mut self.doing,
            CollectionType::OnHold => &mut self.on_hold,
            CollectionType::Dropped => &mut self.dropped,
        }
    }

    /// Total number of collected subjects across all lists.
    pub fn total(&self) -> usize {
        CollectionType::ALL
            .iter()
            .map(|&collection_type| self.list(collection_type).len())
            .sum()
    }
}

/// Descriptor for account collection records.
#[derive(Debug, Clone, Default)]
pub struct AccountKind;

impl RecordKind for AccountKind {
    type Record = Account;

    fn dataset(&self) -> &'static str {
        "user"
    }

    fn key_column(&self) -> &'static str {
        "user_id"
    }

    fn natural_key(&self, record: &Account) -> u64 {
        record.user_id
    }

    fn check(&self, record: &Account) -> Result<(), String> {
        if record.user_id == 0 {
            return Err("account has no user id".to_string());
        }
        Ok(())
    }

    fn resolve(&self, record: &mut Account, catalog: &RemapTable) -> Result<(), String> {
        let user_id = record.user_id;
        for collection_type in CollectionType::ALL {
            record.list_mut(collection_type).retain_mut(|item| {
                match catalog.get(item.subject_id) {
                    Some(project_id) => {
                        item.project_id = project_id;
                        true
                    }
                    None => {
                        log::debug!(
                            "user {}: subject {} in {} is not in the catalog, dropped",
                            user_id,
                            item.subject_id,
                            collection_type
                        );
                        false
                    }
                }
            });
        }
        Ok(())
    }

    fn depends_on_catalog(&self) -> bool {
        true
    }

    fn merge(&self, existing: &mut Account, fresh: Account) {
        let name = fresh.name.clone().or_else(|| existing.name.take());
        *existing = fresh;
        existing.name = name;
    }

    fn is_empty(&self, record: &Account) -> bool {
        record.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(subject_id: u64, rate: u8) -> UserCollection {
        UserCollection {
            subject_id,
            subject_type: 2,
            collection_type: 2,
            rate,
            ..UserCollection::default()
        }
    }

    #[test]
    fn from_collections_keeps_last_duplicate() {
        let account = Account::from_collections(
            9,
            None,
            vec![(
                CollectionType::Collect,
                vec![item(5, 6), item(3, 7), item(5, 9)],
            )],
        );

        let ids: Vec<_> = account.collect.iter().map(|s| s.subject_id).collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(account.collect[1].rate, 9);
        assert_eq!(account.total(), 2);
    }

    #[test]
    fn resolve_drops_subjects_missing_from_catalog() {
        let catalog: RemapTable = [(3, 1)].into_iter().collect();
        let mut account = Account::from_collections(
            9,
            None,
            vec![(CollectionType::Wish, vec![item(3, 0), item(4, 0)])],
        );

        AccountKind.resolve(&mut account, &catalog).unwrap();
        assert_eq!(account.wish.len(), 1);
        assert_eq!(account.wish[0].project_id, 1);
    }

    #[test]
    fn merge_keeps_known_username() {
        let mut existing = Account {
            user_id: 9,
            name: Some("sai".into()),
            ..Account::default()
        };
        let fresh = Account {
            user_id: 9,
            wish: vec![CollectedSubject::default()],
            ..Account::default()
        };

        AccountKind.merge(&mut existing, fresh);
        assert_eq!(existing.name.as_deref(), Some("sai"));
        assert_eq!(existing.wish.len(), 1);
        assert!(!AccountKind.is_empty(&existing));
    }
}
