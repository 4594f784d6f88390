//! Response sink handed to request handlers.
//!
//! Provides methods for answering a request:
//! - `respond` - send the single response of a unary call
//! - `chunk` - send one message of a stream
//! - `end` - end a stream (empty payload)
//! - `error` - fail the call with a [`Status`]

use bytes::Bytes;

use crate::codec::Message;
use crate::error::Result;
use crate::protocol::{flags, Frame};
use crate::rpc::Status;
use crate::writer::WriterHandle;

/// Writes response frames for one request.
///
/// `ResponseSink` is `Clone` and can be moved into spawned tasks. Without a
/// writer (see [`ResponseSink::new`]) every send succeeds and goes nowhere,
/// which lets handlers be unit tested directly.
#[derive(Clone)]
pub struct ResponseSink {
    request_id: u32,
    writer: Option<WriterHandle>,
}

impl ResponseSink {
    /// Sink that discards everything.
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            writer: None,
        }
    }

    pub fn with_writer(request_id: u32, writer: WriterHandle) -> Self {
        Self {
            request_id,
            writer: Some(writer),
        }
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Send the response of a unary call.
    pub async fn respond<M: Message>(&self, message: &M) -> Result<()> {
        self.send_frame(flags::RESPONSE, message.encode()).await
    }

    /// Send an already encoded response.
    pub async fn respond_bytes(&self, payload: Bytes) -> Result<()> {
        self.send_frame(flags::RESPONSE, payload).await
    }

    /// Send one message of a stream.
    pub async fn chunk<M: Message>(&self, message: &M) -> Result<()> {
        self.send_frame(flags::STREAM_CHUNK, message.encode()).await
    }

    pub async fn chunk_bytes(&self, payload: Bytes) -> Result<()> {
        self.send_frame(flags::STREAM_CHUNK, payload).await
    }

    /// End a stream.
    ///
    /// STREAM_END frames always have an empty payload.
    pub async fn end(&self) -> Result<()> {
        self.send_frame(flags::STREAM_END_RESPONSE, Bytes::new())
            .await
    }

    /// Fail the call.
    pub async fn error(&self, status: &Status) -> Result<()> {
        self.send_frame(flags::ERROR_RESPONSE, status.encode()).await
    }

    async fn send_frame(&self, frame_flags: u8, payload: Bytes) -> Result<()> {
        match &self.writer {
            Some(writer) => {
                writer
                    .send(Frame::new(frame_flags, self.request_id, payload))
                    .await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuffer, FrameKind};
    use crate::writer::{spawn_writer_task, WriterConfig};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_all_methods_without_writer() {
        let sink = ResponseSink::new(42);
        assert_eq!(sink.request_id(), 42);

        let status = Status::internal("boom");
        assert!(sink.respond(&status).await.is_ok());
        assert!(sink.respond_bytes(Bytes::from_static(b"x")).await.is_ok());
        assert!(sink.chunk(&status).await.is_ok());
        assert!(sink.chunk_bytes(Bytes::new()).await.is_ok());
        assert!(sink.end().await.is_ok());
        assert!(sink.error(&status).await.is_ok());
    }

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (client, mut server) = duplex(4096);
        let (writer, task) = spawn_writer_task(client, WriterConfig::default());
        let sink = ResponseSink::with_writer(7, writer);

        sink.chunk(&Status::not_found("a")).await.unwrap();
        sink.end().await.unwrap();
        sink.error(&Status::internal("late")).await.unwrap();
        drop(sink);
        task.await.unwrap().unwrap();

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        let frames = FrameBuffer::new().push(&bytes).unwrap();
        let kinds: Vec<_> = frames.iter().map(|f| f.kind().unwrap()).collect();
        assert_eq!(
            kinds,
            vec![FrameKind::StreamChunk, FrameKind::StreamEnd, FrameKind::Error]
        );
        assert!(frames.iter().all(|f| f.request_id() == 7));
        assert!(frames[1].payload.is_empty());
        assert_eq!(
            Status::decode(&frames[2].payload).unwrap(),
            Status::internal("late")
        );
    }
}
