// src/services/accounts.rs

//! Account collection source.
//!
//! One unit is one account. All five collection types are walked in turn;
//! the unit only succeeds when every type was read completely, so a retry
//! always starts the whole account over. Accounts without a stored username
//! get one looked up first; the numeric id is the fallback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ApiClient, FetchError, UnitSource};
use crate::models::{Account, AccountKind, CollectionType, UserCollection};

/// `GET users/{name-or-id}/collections?subject_type=&type=` for types 1..=5.
pub struct AccountSource {
    api: Arc<ApiClient>,
    subject_type: u8,
    names: HashMap<u64, String>,
}

impl AccountSource {
    pub fn new(api: Arc<ApiClient>, subject_type: u8) -> Self {
        Self {
            api,
            subject_type,
            names: HashMap::new(),
        }
    }

    /// Known usernames, used in request paths instead of numeric ids.
    pub fn with_names(mut self, names: HashMap<u64, String>) -> Self {
        self.names = names;
        self
    }

    async fn resolve_name(&self, user_id: u64) -> Option<String> {
        if let Some(name) = self.names.get(&user_id) {
            return Some(name.clone());
        }
        let name = self.api.username(user_id).await;
        if let Some(name) = &name {
            log::debug!("account {} resolved to username {}", user_id, name);
        }
        name
    }
}

#[async_trait]
impl UnitSource for AccountSource {
    type Kind = AccountKind;
    type Unit = u64;

    fn requested_key(&self, unit: &u64) -> Option<u64> {
        Some(*unit)
    }

    async fn fetch(&self, unit: &u64) -> Result<Vec<Account>, FetchError> {
        let name = self.resolve_name(*unit).await;
        let segment = name.clone().unwrap_or_else(|| unit.to_string());
        let path = format!("users/{segment}/collections");
        let mut collections = Vec::with_capacity(CollectionType::ALL.len());

        for collection_type in CollectionType::ALL {
            let url = self.api.endpoint(
                &path,
                &[
                    ("subject_type", self.subject_type.to_string()),
                    ("type", collection_type.code().to_string()),
                ],
            )?;
            let items: Vec<UserCollection> = self.api.collect_pages(url).await?;
            collections.push((collection_type, items));
        }

        Ok(vec![Account::from_collections(*unit, name, collections)])
    }
}
