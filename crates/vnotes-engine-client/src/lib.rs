//! Streaming client for the video inference engine.
//!
//! A processing run opens one stream, sends a metadata frame and the payload
//! in fixed-size chunks, half-closes, and receives exactly one
//! [`ProcessingResult`]. Any transport error aborts the whole run.

pub mod client;
pub mod error;
pub mod frame;
pub mod transport;

pub use client::{EngineClient, EngineClientConfig};
pub use error::{EngineError, EngineResult};
pub use frame::{Frame, ProcessingResult};
pub use transport::{send_payload, EngineStream, EngineTransport};
