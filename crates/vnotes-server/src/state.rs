//! Application state: every service wired to its collaborators.

use std::sync::Arc;

use tracing::info;

use vnotes_ai::{ChatAssistant, ChatClient, SummaryAssistant};
use vnotes_engine_client::{EngineClient, EngineTransport};
use vnotes_firestore::{
    DocumentStore, FirestoreClient, MemoryStore, SessionRepository, UserRepository,
    VideoRepository,
};
use vnotes_worker::{IngestionService, JobSupervisor, QuotaGate, StaleJobDetector, WorkerConfig};

use crate::config::{ServerConfig, StoreBackend};
use crate::sessions::ConversationService;
use crate::videos::VideoService;

pub type StartupError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub worker: WorkerConfig,
    pub store: Arc<dyn DocumentStore>,
    pub supervisor: Arc<JobSupervisor>,
    pub videos: VideoService,
    pub conversations: ConversationService,
    pub stale_detector: Arc<StaleJobDetector>,
}

impl AppState {
    /// Build the state from environment configuration.
    pub async fn from_env(config: ServerConfig) -> Result<Self, StartupError> {
        let worker = WorkerConfig::from_env()?;

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Firestore => Arc::new(FirestoreClient::from_env().await?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        let engine = Arc::new(EngineClient::from_env()?);
        let chat = ChatClient::from_env()?;
        if !chat.config().is_configured() {
            info!("OPENROUTER_API_KEY not set; AI calls will report the service unavailable");
        }
        let assistant = Arc::new(ChatAssistant::new(Arc::new(chat)));

        info!(
            store = config.store_backend.as_str(),
            max_concurrent_jobs = worker.max_concurrent_jobs,
            "Application state initialized"
        );
        Ok(Self::new(config, worker, store, engine, assistant))
    }

    /// Wire the services over explicit collaborators.
    pub fn new(
        config: ServerConfig,
        worker: WorkerConfig,
        store: Arc<dyn DocumentStore>,
        engine: Arc<dyn EngineTransport>,
        assistant: Arc<dyn SummaryAssistant>,
    ) -> Self {
        let videos = VideoRepository::new(Arc::clone(&store));
        let sessions = SessionRepository::new(Arc::clone(&store));
        let users = UserRepository::new(Arc::clone(&store));

        let supervisor = Arc::new(JobSupervisor::new(worker.max_concurrent_jobs));
        let ingestion = IngestionService::new(
            videos.clone(),
            QuotaGate::new(users),
            engine,
            Arc::clone(&supervisor),
            &worker,
        );
        let stale_detector = Arc::new(StaleJobDetector::new(videos.clone(), &worker));

        Self {
            config,
            worker,
            store,
            supervisor,
            videos: VideoService::new(videos.clone(), ingestion),
            conversations: ConversationService::new(videos, sessions, assistant),
            stale_detector,
        }
    }

    /// Stop accepting uploads and wait for in-flight jobs.
    pub async fn shutdown(&self) -> bool {
        self.supervisor.shutdown(self.worker.shutdown_timeout).await
    }
}
