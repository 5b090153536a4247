//! Firestore REST API client.
//!
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_query_results, record_request};
use crate::retry::{with_retry, RetryConfig};
use crate::store::{DocumentStore, StoredDocument};
use crate::token_cache::{TokenCache, TokenSource, EMULATOR_TOKEN};
use crate::types::{
    ArrayValue, CommitRequest, Document, DocumentTransform, FieldTransform, Fields, Precondition,
    RunQueryRequest, RunQueryResponse, StructuredQuery, Value, Write,
};

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a Firestore emulator, bypasses service account auth
    pub emulator_host: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let secs = |key: &str, default: u64| -> Duration {
            Duration::from_secs(
                std::env::var(key)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: secs("FIRESTORE_TIMEOUT_SECS", 30),
            connect_timeout: secs("FIRESTORE_CONNECT_TIMEOUT_SECS", 5),
            retry: RetryConfig::from_env(),
        })
    }

    /// Resource prefix shared by all documents of the database.
    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let (origin, source) = match &config.emulator_host {
            Some(host) => (
                format!("http://{}", host),
                TokenSource::Static(EMULATOR_TOKEN.to_string()),
            ),
            None => (
                "https://firestore.googleapis.com".to_string(),
                TokenSource::Provider(Self::create_auth_provider()?),
            ),
        };
        Self::with_origin(config, &origin, source)
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Build a client against an arbitrary origin (emulator or test server).
    pub fn with_origin(
        config: FirestoreConfig,
        origin: &str,
        source: TokenSource,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vnotes-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/v1/{}",
            origin.trim_end_matches('/'),
            config.database_path()
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(source)),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Full resource name, as used inside commit writes.
    fn document_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.config.database_path(), collection, doc_id)
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    /// Send a request with a bearer token, refreshing once on an expired token.
    async fn send_authorized<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, body));
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    /// Execute a request with retry, tracing and metrics.
    async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        op: F,
    ) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = doc_id.unwrap_or("")
        );

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, op)
            .instrument(span)
            .await;
        let latency_secs = start.elapsed().as_secs_f64();

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_secs);

        result
    }

    async fn error_from_response(url: &str, response: Response) -> FirestoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }

    fn into_stored(doc: Document, fallback_id: Option<&str>) -> FirestoreResult<StoredDocument> {
        let id = doc
            .id()
            .or(fallback_id)
            .map(str::to_string)
            .ok_or_else(|| FirestoreError::InvalidResponse("Document has no name".to_string()))?;
        Ok(StoredDocument {
            id,
            fields: doc.fields.unwrap_or_default(),
        })
    }

    /// Sorted `updateMask.fieldPaths` query parameters for `fields`.
    fn update_mask(fields: &Fields) -> Vec<String> {
        let mut params: Vec<String> = fields
            .keys()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.sort();
        params
    }

    /// Run a structured query against the database root.
    async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute("run_query", &collection, None, || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            if response.status() != StatusCode::OK {
                return Err(Self::error_from_response(&url, response).await);
            }

            let body = response.text().await.unwrap_or_default();
            let responses: Vec<RunQueryResponse> = serde_json::from_str(&body).map_err(|e| {
                FirestoreError::InvalidResponse(format!(
                    "Failed to parse runQuery response: {} (body prefix: {})",
                    e,
                    body.chars().take(200).collect::<String>()
                ))
            })?;

            Ok(responses.into_iter().filter_map(|r| r.document).collect())
        })
        .await
    }
}

// =============================================================================
// DocumentStore
// =============================================================================

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn create(&self, collection: &str, fields: Fields) -> FirestoreResult<String> {
        // No documentId parameter: Firestore assigns one.
        let url = format!("{}/{}", self.base_url, collection);
        let body = Document::new(fields);

        let doc: Document = self
            .execute("create_document", collection, None, || async {
                let response = self
                    .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&body))
                    .await?;

                match response.status() {
                    StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                    _ => Err(Self::error_from_response(&url, response).await),
                }
            })
            .await?;

        Ok(Self::into_stored(doc, None)?.id)
    }

    async fn get(&self, collection: &str, id: &str) -> FirestoreResult<Option<StoredDocument>> {
        let url = self.document_url(collection, id);

        self.execute("get_document", collection, Some(id), || async {
            let response = self
                .send_authorized(|token| self.http.get(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let doc: Document = response.json().await?;
                    Ok(Some(Self::into_stored(doc, Some(id))?))
                }
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(Self::error_from_response(&url, response).await),
            }
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> FirestoreResult<()> {
        let mut params = Self::update_mask(&fields);
        params.push("currentDocument.exists=true".to_string());
        let url = format!("{}?{}", self.document_url(collection, id), params.join("&"));
        let body = Document::new(fields);

        self.execute("update_document", collection, Some(id), || async {
            let response = self
                .send_authorized(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(()),
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{}/{}", collection, id)))
                }
                _ => Err(Self::error_from_response(&url, response).await),
            }
        })
        .await
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Fields,
    ) -> FirestoreResult<bool> {
        let doc_url = self.document_url(collection, id);
        let mask = Self::update_mask(&fields).join("&");
        let body = Document::new(fields);

        // Read the guard field, then write with an updateTime precondition so a
        // write landing in between makes the merge fail instead of clobbering it.
        self.execute("update_document_if", collection, Some(id), || async {
            let response = self
                .send_authorized(|token| self.http.get(&doc_url).bearer_auth(token))
                .await?;
            let current: Document = match response.status() {
                StatusCode::OK => response.json().await?,
                StatusCode::NOT_FOUND => {
                    return Err(FirestoreError::not_found(format!("{}/{}", collection, id)))
                }
                _ => return Err(Self::error_from_response(&doc_url, response).await),
            };

            let guard_holds = current
                .fields
                .as_ref()
                .and_then(|f| f.get(field))
                .is_some_and(|v| v == expected);
            if !guard_holds {
                debug!("Guard on {}/{}.{} no longer holds", collection, id, field);
                return Ok(false);
            }

            let update_time = current.update_time.ok_or_else(|| {
                FirestoreError::InvalidResponse(format!("{}/{} has no updateTime", collection, id))
            })?;
            let url = format!(
                "{}?{}&currentDocument.updateTime={}",
                doc_url,
                mask,
                urlencoding::encode(&update_time)
            );

            let response = self
                .send_authorized(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            let status = response.status();
            match status {
                StatusCode::OK => Ok(true),
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{}/{}", collection, id)))
                }
                StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                    let text = response.text().await.unwrap_or_default();
                    if text.contains("FAILED_PRECONDITION") {
                        debug!("{}/{} changed before the guarded write", collection, id);
                        Ok(false)
                    } else {
                        Err(FirestoreError::from_http_status(
                            status.as_u16(),
                            format!("{} failed: {}", url, text),
                        ))
                    }
                }
                _ => Err(Self::error_from_response(&url, response).await),
            }
        })
        .await
    }

    async fn append(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> FirestoreResult<()> {
        let url = format!("{}:commit", self.base_url);
        let request = CommitRequest {
            writes: vec![Write {
                transform: DocumentTransform {
                    document: self.document_name(collection, id),
                    field_transforms: vec![FieldTransform {
                        field_path: field.to_string(),
                        append_missing_elements: ArrayValue {
                            values: Some(values),
                        },
                    }],
                },
                current_document: Some(Precondition { exists: true }),
            }],
        };

        self.execute("append_array", collection, Some(id), || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(()),
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{}/{}", collection, id)))
                }
                _ => Err(Self::error_from_response(&url, response).await),
            }
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> FirestoreResult<()> {
        let url = self.document_url(collection, id);

        self.execute("delete_document", collection, Some(id), || async {
            let response = self
                .send_authorized(|token| self.http.delete(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted", collection, id);
                    Ok(())
                }
                _ => Err(Self::error_from_response(&url, response).await),
            }
        })
        .await
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> FirestoreResult<Vec<StoredDocument>> {
        let docs = self
            .run_query(StructuredQuery::field_equals(collection, field, value))
            .await?;
        record_query_results(collection, docs.len());

        docs.into_iter()
            .map(|doc| Self::into_stored(doc, None))
            .collect()
    }
}
