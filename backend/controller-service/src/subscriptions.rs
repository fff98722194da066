//! Client subscription preferences
//!
//! In-memory only: preferences are lost on restart and are not shared with
//! sibling instances. Readers and writers go through an async `RwLock`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPreference {
    pub client_id: String,
    pub filter: String,
}

#[derive(Default, Clone)]
pub struct SubscriptionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All preferences, ordered by client id.
    pub async fn list(&self) -> Vec<SubscriptionPreference> {
        let guard = self.inner.read().await;
        let mut all: Vec<_> = guard
            .iter()
            .map(|(client_id, filter)| SubscriptionPreference {
                client_id: client_id.clone(),
                filter: filter.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        all
    }

    pub async fn get(&self, client_id: &str) -> Option<SubscriptionPreference> {
        self.inner
            .read()
            .await
            .get(client_id)
            .map(|filter| SubscriptionPreference {
                client_id: client_id.to_string(),
                filter: filter.clone(),
            })
    }

    /// Insert or replace.
    pub async fn upsert(&self, client_id: &str, filter: &str) -> SubscriptionPreference {
        self.inner
            .write()
            .await
            .insert(client_id.to_string(), filter.to_string());
        SubscriptionPreference {
            client_id: client_id.to_string(),
            filter: filter.to_string(),
        }
    }

    /// Replace an existing preference; `None` if the client is unknown.
    pub async fn update(&self, client_id: &str, filter: &str) -> Option<SubscriptionPreference> {
        let mut guard = self.inner.write().await;
        let slot = guard.get_mut(client_id)?;
        *slot = filter.to_string();
        Some(SubscriptionPreference {
            client_id: client_id.to_string(),
            filter: filter.to_string(),
        })
    }

    pub async fn remove(&self, client_id: &str) -> bool {
        self.inner.write().await.remove(client_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SubscriptionStore::new();
        store.upsert("client-1", "sensor:s1").await;

        let pref = store.get("client-1").await.unwrap();
        assert_eq!(pref.filter, "sensor:s1");

        store.upsert("client-1", "sensor:s2").await;
        assert_eq!(store.get("client-1").await.unwrap().filter, "sensor:s2");
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = SubscriptionStore::new();
        assert!(store.update("ghost", "x").await.is_none());

        store.upsert("client-1", "a").await;
        assert_eq!(store.update("client-1", "b").await.unwrap().filter, "b");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SubscriptionStore::new();
        store.upsert("client-1", "a").await;

        assert!(store.remove("client-1").await);
        assert!(!store.remove("client-1").await);
        assert!(store.get("client-1").await.is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = SubscriptionStore::new();
        store.upsert("b", "2").await;
        store.upsert("a", "1").await;

        let ids: Vec<_> = store.list().await.into_iter().map(|p| p.client_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_preference_serializes_camel_case() {
        let pref = SubscriptionPreference {
            client_id: "c".into(),
            filter: "f".into(),
        };
        let json = serde_json::to_value(&pref).unwrap();
        assert_eq!(json["clientId"], "c");
        assert_eq!(json["filter"], "f");
    }
}
