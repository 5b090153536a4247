//! Transport abstraction for engine streams.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::frame::ProcessingResult;

/// Opens processing streams to the inference engine.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Open a stream. Every send and the final receive must finish within `timeout`.
    async fn open(&self, timeout: Duration) -> EngineResult<Box<dyn EngineStream>>;
}

/// One open processing stream: metadata first, then chunks, then close.
#[async_trait]
pub trait EngineStream: Send {
    async fn send_metadata(&mut self, filename: &str, job_id: &str) -> EngineResult<()>;

    async fn send_chunk(&mut self, data: &[u8]) -> EngineResult<()>;

    /// Half-close the stream and wait for the engine's single response.
    async fn close_and_recv(self: Box<Self>) -> EngineResult<ProcessingResult>;
}

/// Send `payload` as consecutive chunks of at most `chunk_size` bytes.
///
/// Chunks borrow from `payload`; nothing is copied beyond frame encoding.
/// Returns the number of chunks sent.
pub async fn send_payload(
    stream: &mut dyn EngineStream,
    payload: &[u8],
    chunk_size: usize,
) -> EngineResult<usize> {
    let mut sent = 0;
    for chunk in payload.chunks(chunk_size.max(1)) {
        stream.send_chunk(chunk).await?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[derive(Default)]
    struct Recording {
        chunks: Vec<Vec<u8>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl EngineStream for Recording {
        async fn send_metadata(&mut self, _filename: &str, _job_id: &str) -> EngineResult<()> {
            Ok(())
        }

        async fn send_chunk(&mut self, data: &[u8]) -> EngineResult<()> {
            if self.fail_at == Some(self.chunks.len()) {
                return Err(EngineError::send_failed(0, "broken pipe"));
            }
            self.chunks.push(data.to_vec());
            Ok(())
        }

        async fn close_and_recv(self: Box<Self>) -> EngineResult<ProcessingResult> {
            Ok(ProcessingResult::default())
        }
    }

    #[tokio::test]
    async fn test_send_payload_splits_evenly() {
        let mut stream = Recording::default();
        let payload = vec![7u8; 10];
        let sent = send_payload(&mut stream, &payload, 4).await.unwrap();

        assert_eq!(sent, 3);
        let sizes: Vec<usize> = stream.chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(stream.chunks.concat(), payload);
    }

    #[tokio::test]
    async fn test_send_payload_stops_on_failure() {
        let mut stream = Recording {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = send_payload(&mut stream, &[1u8; 12], 4).await.unwrap_err();

        assert!(matches!(err, EngineError::SendFailed { .. }));
        assert_eq!(stream.chunks.len(), 1);
    }
}
