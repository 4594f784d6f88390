//! Dedicated writer task for outbound frames.
//!
//! Callers never touch the write half of a connection directly. They send
//! frames over a bounded channel to one task that owns it, which coalesces
//! whatever is queued into a single buffer per write.
//!
//! ```text
//! Call 1 ─┐
//! Call 2 ─┼─► mpsc::Sender<Frame> ─► Writer Task ─► socket
//! Call N ─┘
//! ```
//!
//! A full channel is the backpressure signal: `send` waits up to
//! `send_timeout` for room and then fails with `BackpressureTimeout`.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{ProtostubError, Result};
use crate::protocol::Frame;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time to wait for channel capacity.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames coalesced into one write.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Frames that may be queued before senders wait.
    pub channel_capacity: usize,
    /// How long a sender waits for room before giving up.
    pub send_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheap to clone; the task exits once every handle is dropped.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Frame>,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame, waiting for capacity up to the configured timeout.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ProtostubError::ConnectionClosed),
            Err(_) => Err(ProtostubError::BackpressureTimeout),
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Used from `Drop` impls, where awaiting is impossible.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ProtostubError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => ProtostubError::ConnectionClosed,
        })
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The returned `JoinHandle` resolves when every handle has been dropped or
/// a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let handle = WriterHandle {
        tx,
        timeout: config.send_timeout,
    };
    let task = tokio::spawn(writer_loop(rx, writer));
    (handle, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Frame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    while let Some(first) = rx.recv().await {
        first.encode_into(&mut buf);
        let mut batched = 1;
        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    frame.encode_into(&mut buf);
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        trace!(frames = batched, bytes = buf.len(), "writing batch");
        writer.write_all(&buf).await?;
        writer.flush().await?;
        buf.clear();
    }

    debug!("writer channel closed, shutting down");
    let _ = writer.shutdown().await;
    Ok(())
}
