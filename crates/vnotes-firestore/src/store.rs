//! Key-indexed record store abstraction.
//!
//! Repositories are written against [`DocumentStore`] so the Firestore REST
//! client and the in-memory store are interchangeable.

use async_trait::async_trait;

use crate::error::FirestoreResult;
use crate::types::{Fields, Value};

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

/// Generic document CRUD plus equality-filtered lookup.
///
/// Every call is individually atomic. Nothing spans multiple calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return the store-assigned ID.
    async fn create(&self, collection: &str, fields: Fields) -> FirestoreResult<String>;

    /// Read a document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> FirestoreResult<Option<StoredDocument>>;

    /// Merge `fields` into an existing document. Fails with `NotFound` if missing.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> FirestoreResult<()>;

    /// Merge `fields` only while `field` still equals `expected`.
    ///
    /// Returns `false` and leaves the document untouched when the guard does
    /// not hold or another write lands between the check and the merge.
    /// Fails with `NotFound` if the document is missing.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Fields,
    ) -> FirestoreResult<bool>;

    /// Append `values` to the array field `field` of an existing document.
    async fn append(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> FirestoreResult<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> FirestoreResult<()>;

    /// All documents of `collection` whose `field` equals `value`.
    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> FirestoreResult<Vec<StoredDocument>>;
}
