//! In-process [`DocumentStore`] for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{DocumentStore, StoredDocument};
use crate::types::{ArrayValue, Fields, Value};

/// Documents held in memory, keyed by collection then ID.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Fields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document under a caller-chosen ID.
    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> FirestoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.insert(collection, &id, fields).await;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> FirestoreResult<Option<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| StoredDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> FirestoreResult<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", collection, id)))?;
        doc.extend(fields);
        Ok(())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Fields,
    ) -> FirestoreResult<bool> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", collection, id)))?;
        if doc.get(field) != Some(expected) {
            return Ok(false);
        }
        doc.extend(fields);
        Ok(true)
    }

    async fn append(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> FirestoreResult<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", collection, id)))?;

        let mut items = doc
            .get(field)
            .map(|v| v.array_items().to_vec())
            .unwrap_or_default();
        items.extend(values);
        doc.insert(
            field.to_string(),
            Value::ArrayValue(ArrayValue {
                values: Some(items),
            }),
        );
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> FirestoreResult<()> {
        if let Some(docs) = self.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> FirestoreResult<Vec<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| fields.get(field) == Some(&value))
                    .map(|(id, fields)| StoredDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToFirestoreValue;
    use tokio_test::{assert_err, assert_ok};

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_firestore_value()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let store = MemoryStore::new();
        let a = store.create("videos", fields(&[("title", "a")])).await.unwrap();
        let b = store.create("videos", fields(&[("title", "b")])).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count("videos").await, 2);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        let id = store
            .create("videos", fields(&[("title", "a"), ("status", "uploaded")]))
            .await
            .unwrap();
        store
            .update("videos", &id, fields(&[("status", "processing")]))
            .await
            .unwrap();

        let doc = store.get("videos", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields.get("status"), Some(&"processing".to_firestore_value()));
        assert_eq!(doc.fields.get("title"), Some(&"a".to_firestore_value()));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update("videos", "nope", Fields::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_if_applies_only_while_guard_holds() {
        let store = MemoryStore::new();
        let id = store
            .create("videos", fields(&[("status", "processing")]))
            .await
            .unwrap();
        let processing = "processing".to_firestore_value();

        let applied = assert_ok!(
            store
                .update_if("videos", &id, "status", &processing, fields(&[("status", "failed")]))
                .await
        );
        assert!(applied);

        let applied = assert_ok!(
            store
                .update_if("videos", &id, "status", &processing, fields(&[("status", "completed")]))
                .await
        );
        assert!(!applied);

        let doc = store.get("videos", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields.get("status"), Some(&"failed".to_firestore_value()));

        let err = assert_err!(
            store
                .update_if("videos", "nope", "status", &processing, Fields::new())
                .await
        );
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = MemoryStore::new();
        let id = store.create("sessions", Fields::new()).await.unwrap();
        store
            .append("sessions", &id, "messages", vec!["one".to_firestore_value()])
            .await
            .unwrap();
        store
            .append("sessions", &id, "messages", vec!["two".to_firestore_value()])
            .await
            .unwrap();

        let doc = store.get("sessions", &id).await.unwrap().unwrap();
        let items = doc.fields["messages"].array_items();
        assert_eq!(items, &["one".to_firestore_value(), "two".to_firestore_value()]);
    }

    #[tokio::test]
    async fn test_find_eq_and_delete() {
        let store = MemoryStore::new();
        let keep = store.create("videos", fields(&[("user_id", "u1")])).await.unwrap();
        store.create("videos", fields(&[("user_id", "u2")])).await.unwrap();

        let found = store
            .find_eq("videos", "user_id", "u1".to_firestore_value())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, keep);

        store.delete("videos", &keep).await.unwrap();
        store.delete("videos", &keep).await.unwrap();
        assert!(store.get("videos", &keep).await.unwrap().is_none());
    }
}
