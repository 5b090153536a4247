//! Server configuration.

use std::net::SocketAddr;

/// Which record store backs the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    /// Process-local store for development; nothing survives a restart.
    Memory,
}

impl StoreBackend {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Firestore,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firestore => "firestore",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub store_backend: StoreBackend,
    /// Prometheus exporter listen address, exporter disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            store_backend: std::env::var("STORE_BACKEND")
                .map(|v| StoreBackend::from_str(&v))
                .unwrap_or_default(),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}
