//! Record store for the VidNotes backend.
//!
//! This crate provides:
//! - The [`DocumentStore`] abstraction (create, get, merge update, array append,
//!   delete, equality find)
//! - A Firestore REST implementation with service account or emulator auth
//! - An in-memory implementation for local runs and tests
//! - Typed repositories for videos, conversation sessions and user quota

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryStore;
pub use repos::{SessionRepository, UserRepository, VideoRepository};
pub use store::{DocumentStore, StoredDocument};
pub use types::{Fields, FromFirestoreValue, ToFirestoreValue, Value};
