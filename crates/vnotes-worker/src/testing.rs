//! Fakes shared by the worker tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use vnotes_engine_client::{
    EngineError, EngineResult, EngineStream, EngineTransport, ProcessingResult,
};
use vnotes_firestore::repos::{quota_to_fields, USERS_COLLECTION, VIDEOS_COLLECTION};
use vnotes_firestore::{
    DocumentStore, Fields, FirestoreError, FirestoreResult, MemoryStore, StoredDocument,
    ToFirestoreValue, Value,
};
use vnotes_models::QuotaState;

// =============================================================================
// Store
// =============================================================================

/// In-memory store that records video status writes and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub status_writes: Mutex<Vec<String>>,
    pub fail_creates: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<String> {
        self.status_writes.lock().unwrap().clone()
    }

    pub async fn add_user(&self, id: &str, plan: &str, quota: &QuotaState) {
        let mut fields = quota_to_fields(quota);
        fields.insert("subscription".to_string(), plan.to_firestore_value());
        self.inner.insert(USERS_COLLECTION, id, fields).await;
    }

    pub async fn video_count(&self) -> usize {
        self.inner.count(VIDEOS_COLLECTION).await
    }
}

fn unavailable() -> FirestoreError {
    FirestoreError::ServerError(503, "unavailable".to_string())
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn create(&self, collection: &str, fields: Fields) -> FirestoreResult<String> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if collection == VIDEOS_COLLECTION {
            if let Some(Value::StringValue(status)) = fields.get("status") {
                self.status_writes.lock().unwrap().push(status.clone());
            }
        }
        self.inner.create(collection, fields).await
    }

    async fn get(&self, collection: &str, id: &str) -> FirestoreResult<Option<StoredDocument>> {
        self.inner.get(collection, id).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> FirestoreResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) && collection == VIDEOS_COLLECTION {
            return Err(unavailable());
        }
        if collection == VIDEOS_COLLECTION {
            if let Some(Value::StringValue(status)) = fields.get("status") {
                self.status_writes.lock().unwrap().push(status.clone());
            }
        }
        self.inner.update(collection, id, fields).await
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Fields,
    ) -> FirestoreResult<bool> {
        if self.fail_updates.load(Ordering::SeqCst) && collection == VIDEOS_COLLECTION {
            return Err(unavailable());
        }
        let status = match fields.get("status") {
            Some(Value::StringValue(status)) if collection == VIDEOS_COLLECTION => {
                Some(status.clone())
            }
            _ => None,
        };
        let applied = self
            .inner
            .update_if(collection, id, field, expected, fields)
            .await?;
        if let (true, Some(status)) = (applied, status) {
            self.status_writes.lock().unwrap().push(status);
        }
        Ok(applied)
    }

    async fn append(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> FirestoreResult<()> {
        self.inner.append(collection, id, field, values).await
    }

    async fn delete(&self, collection: &str, id: &str) -> FirestoreResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> FirestoreResult<Vec<StoredDocument>> {
        self.inner.find_eq(collection, field, value).await
    }
}

// =============================================================================
// Engine
// =============================================================================

/// How the scripted engine behaves.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(ProcessingResult),
    RefuseOpen,
    BreakAtChunk(usize),
    Hang,
}

/// What the scripted engine saw.
#[derive(Debug, Default, Clone)]
pub struct Received {
    pub metadata: Option<(String, String)>,
    pub chunks: usize,
    pub bytes: usize,
    pub max_chunk: usize,
}

/// Engine transport driven by a [`Script`].
///
/// With `hold` set, the final response waits until the notify is signalled.
pub struct ScriptedEngine {
    script: Script,
    pub received: Arc<Mutex<Received>>,
    pub hold: Option<Arc<Notify>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            received: Arc::default(),
            hold: None,
        })
    }

    pub fn held(script: Script, hold: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            script,
            received: Arc::default(),
            hold: Some(hold),
        })
    }

    pub fn completing(summary: &str) -> Arc<Self> {
        Self::new(Script::Respond(ProcessingResult {
            status: "completed".to_string(),
            summary: summary.to_string(),
            error: String::new(),
        }))
    }

    pub fn received(&self) -> Received {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineTransport for ScriptedEngine {
    async fn open(&self, _timeout: Duration) -> EngineResult<Box<dyn EngineStream>> {
        if matches!(self.script, Script::RefuseOpen) {
            return Err(EngineError::open_failed("connection refused"));
        }
        Ok(Box::new(ScriptedStream {
            script: self.script.clone(),
            received: Arc::clone(&self.received),
            hold: self.hold.clone(),
        }))
    }
}

struct ScriptedStream {
    script: Script,
    received: Arc<Mutex<Received>>,
    hold: Option<Arc<Notify>>,
}

#[async_trait]
impl EngineStream for ScriptedStream {
    async fn send_metadata(&mut self, filename: &str, job_id: &str) -> EngineResult<()> {
        self.received.lock().unwrap().metadata = Some((filename.to_string(), job_id.to_string()));
        Ok(())
    }

    async fn send_chunk(&mut self, data: &[u8]) -> EngineResult<()> {
        let mut received = self.received.lock().unwrap();
        if let Script::BreakAtChunk(n) = self.script {
            if received.chunks == n {
                return Err(EngineError::send_failed(received.bytes as u64, "broken pipe"));
            }
        }
        received.chunks += 1;
        received.bytes += data.len();
        received.max_chunk = received.max_chunk.max(data.len());
        Ok(())
    }

    async fn close_and_recv(self: Box<Self>) -> EngineResult<ProcessingResult> {
        let this = *self;
        if let Some(hold) = &this.hold {
            hold.notified().await;
        }
        match this.script {
            Script::Respond(result) => Ok(result),
            Script::Hang => {
                std::future::pending::<()>().await;
                Err(EngineError::Closed)
            }
            Script::RefuseOpen | Script::BreakAtChunk(_) => {
                Err(EngineError::ResponseFailed("unexpected".to_string()))
            }
        }
    }
}
