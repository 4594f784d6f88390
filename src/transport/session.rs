//! Client side of a framed connection.
//!
//! A [`FramedSession`] owns one byte stream. Outbound frames go through the
//! writer task; a read loop routes inbound frames to the call that owns
//! their request id.
//!
//! ```text
//! unary() ──────────┐                      ┌─► oneshot (unary)
//! server_streaming()┼─► WriterHandle ─► io ┤
//! drop(stream) ─────┘   (CANCEL)           └─► mpsc (stream)
//!                                 read loop ┘
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::codec::Message;
use crate::error::{ProtostubError, Result};
use crate::protocol::{flags, Frame, FrameBuffer, FrameKind, RESERVED_REQUEST_ID};
use crate::rpc::{BoxFuture, ByteStream, MethodPath, Status, Transport};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Size of the socket read buffer.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

enum Pending {
    Unary(oneshot::Sender<Result<Bytes>>),
    Stream(mpsc::UnboundedSender<Result<Bytes>>),
}

impl Pending {
    fn fail(self, err: ProtostubError) {
        match self {
            Pending::Unary(tx) => {
                let _ = tx.send(Err(err));
            }
            Pending::Stream(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

#[derive(Default)]
struct SessionState {
    pending: HashMap<u32, Pending>,
    closed: bool,
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mark the session closed and fail every call still waiting.
fn fail_pending(state: &Mutex<SessionState>) {
    let drained: Vec<_> = {
        let mut state = lock(state);
        state.closed = true;
        state.pending.drain().collect()
    };
    if !drained.is_empty() {
        debug!(calls = drained.len(), "failing pending calls");
    }
    for (_, pending) in drained {
        pending.fail(ProtostubError::ConnectionClosed);
    }
}

/// A multiplexed call connection over one byte stream.
pub struct FramedSession {
    writer: WriterHandle,
    state: SharedState,
    next_id: AtomicU32,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl FramedSession {
    /// Take ownership of `io` and start the reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<IO>(io: IO, config: WriterConfig) -> Self
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(io);
        let (writer, writer_task) = spawn_writer_task(write_half, config);
        let state = SharedState::default();

        let loop_state = state.clone();
        let reader_task = tokio::spawn(async move {
            match read_loop(reader, &loop_state).await {
                Ok(()) => debug!("connection closed by peer"),
                Err(e) => error!("Read loop error: {}", e),
            }
            fail_pending(&loop_state);
        });

        Self {
            writer,
            state,
            next_id: AtomicU32::new(1),
            reader_task,
            writer_task,
        }
    }

    /// Whether the session can no longer carry calls.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed || self.writer.is_closed()
    }

    /// Number of calls waiting for a response or stream end.
    pub fn pending_calls(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Stop both tasks and fail every pending call.
    pub fn close(&self) {
        debug!("closing session");
        self.reader_task.abort();
        self.writer_task.abort();
        fail_pending(&self.state);
    }

    /// Send one request and wait for its response.
    ///
    /// Dropping the returned future before it resolves cancels the call.
    pub async fn unary(&self, path: MethodPath, request: Bytes) -> Result<Bytes> {
        let (tx, rx) = oneshot::channel();
        let guard = self.register(Pending::Unary(tx))?;
        trace!(request_id = guard.id, %path, "sending unary request");
        self.send_request(&guard, path, &request).await?;

        let result = rx.await.map_err(|_| ProtostubError::ConnectionClosed)?;
        drop(guard);
        result
    }

    /// Send one request and return the stream of response chunks.
    ///
    /// Dropping the stream before it ends sends `CANCEL` to the server.
    pub async fn server_streaming(&self, path: MethodPath, request: Bytes) -> Result<ByteStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.register(Pending::Stream(tx))?;
        trace!(request_id = guard.id, %path, "sending streaming request");
        self.send_request(&guard, path, &request).await?;

        Ok(CallStream { rx, _guard: guard }.boxed())
    }

    /// Queue the request frame. A request that never reached the writer is
    /// released without a `CANCEL`.
    async fn send_request(
        &self,
        guard: &CallGuard,
        path: MethodPath,
        request: &[u8],
    ) -> Result<()> {
        let frame = Frame::request(guard.id, &path.route(), request);
        if let Err(e) = self.writer.send(frame).await {
            debug!(request_id = guard.id, error = %e, "request not sent");
            guard.release();
            return Err(e);
        }
        Ok(())
    }

    fn register(&self, pending: Pending) -> Result<CallGuard> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(ProtostubError::ConnectionClosed);
        }
        let id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != RESERVED_REQUEST_ID && !state.pending.contains_key(&id) {
                break id;
            }
        };
        state.pending.insert(id, pending);
        Ok(CallGuard {
            id,
            state: self.state.clone(),
            writer: self.writer.clone(),
        })
    }
}

/// A session is already connected; `connect` only reports whether it is
/// still usable.
impl Transport for FramedSession {
    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_closed() {
                Err(ProtostubError::ConnectionClosed)
            } else {
                Ok(())
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            FramedSession::close(self);
            Ok(())
        })
    }

    fn unary(&self, path: MethodPath, request: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(FramedSession::unary(self, path, request))
    }

    fn server_streaming(
        &self,
        path: MethodPath,
        request: Bytes,
    ) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(FramedSession::server_streaming(self, path, request))
    }
}

impl Drop for FramedSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Releases a call's request id when the caller stops waiting.
///
/// If the call was still pending at that point the server is told to stop
/// with a `CANCEL` frame.
struct CallGuard {
    id: u32,
    state: SharedState,
    writer: WriterHandle,
}

impl CallGuard {
    /// Forget the call without telling the server.
    fn release(&self) {
        lock(&self.state).pending.remove(&self.id);
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let abandoned = lock(&self.state).pending.remove(&self.id).is_some();
        if abandoned {
            debug!(request_id = self.id, "cancelling call");
            if let Err(e) = self.writer.try_send(Frame::empty(flags::CANCEL, self.id)) {
                trace!(request_id = self.id, error = %e, "cancel not sent");
            }
        }
    }
}

struct CallStream {
    rx: mpsc::UnboundedReceiver<Result<Bytes>>,
    _guard: CallGuard,
}

impl Stream for CallStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

async fn read_loop<R>(mut reader: R, state: &Mutex<SessionState>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        for frame in frame_buffer.push(&buf[..n])? {
            route_frame(state, frame);
        }
    }
}

fn route_frame(state: &Mutex<SessionState>, frame: Frame) {
    let id = frame.request_id();
    let kind = match frame.kind() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(request_id = id, error = %e, "dropping invalid frame");
            return;
        }
    };

    let mut state = lock(state);
    match kind {
        FrameKind::Response => match state.pending.remove(&id) {
            Some(Pending::Unary(tx)) => {
                let _ = tx.send(Ok(frame.payload));
            }
            Some(pending) => pending.fail(unexpected(kind, id)),
            None => trace!(request_id = id, "response for unknown call"),
        },
        FrameKind::StreamChunk => match state.pending.get(&id) {
            Some(Pending::Stream(tx)) => {
                if tx.send(Ok(frame.payload)).is_err() {
                    state.pending.remove(&id);
                }
            }
            Some(Pending::Unary(_)) => {
                if let Some(pending) = state.pending.remove(&id) {
                    pending.fail(unexpected(kind, id));
                }
            }
            None => trace!(request_id = id, "chunk for unknown call"),
        },
        FrameKind::StreamEnd => match state.pending.remove(&id) {
            // Dropping the sender ends the stream.
            Some(Pending::Stream(_)) => trace!(request_id = id, "stream ended"),
            Some(pending) => pending.fail(unexpected(kind, id)),
            None => trace!(request_id = id, "stream end for unknown call"),
        },
        FrameKind::Error => match state.pending.remove(&id) {
            Some(pending) => pending.fail(status_error(&frame.payload)),
            None => trace!(request_id = id, "error for unknown call"),
        },
        FrameKind::Request | FrameKind::Cancel => {
            warn!(request_id = id, ?kind, "unexpected frame on client connection");
        }
    }
}

fn unexpected(kind: FrameKind, id: u32) -> ProtostubError {
    warn!(request_id = id, ?kind, "frame does not match call type");
    ProtostubError::Protocol(format!("Unexpected {kind:?} frame for request {id}"))
}

fn status_error(payload: &[u8]) -> ProtostubError {
    match Status::decode(payload) {
        Ok(status) => ProtostubError::Status(status),
        Err(e) => ProtostubError::Protocol(format!("Undecodable error status: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::split_request_payload;
    use crate::rpc::StatusCode;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    const PATH: MethodPath = MethodPath::new("test.Echo", "Echo");

    /// Reads frames written by the session on the far end of a duplex.
    struct Peer {
        io: DuplexStream,
        frames: FrameBuffer,
        ready: Vec<Frame>,
    }

    impl Peer {
        fn new(io: DuplexStream) -> Self {
            Self {
                io,
                frames: FrameBuffer::new(),
                ready: Vec::new(),
            }
        }

        async fn next_frame(&mut self) -> Frame {
            let mut buf = [0u8; 1024];
            while self.ready.is_empty() {
                let n = self.io.read(&mut buf).await.unwrap();
                assert!(n > 0, "session closed the stream");
                self.ready = self.frames.push(&buf[..n]).unwrap();
            }
            self.ready.remove(0)
        }

        async fn send(&mut self, frame: Frame) {
            let mut buf = bytes::BytesMut::new();
            frame.encode_into(&mut buf);
            self.io.write_all(&buf).await.unwrap();
        }
    }

    fn session() -> (FramedSession, Peer) {
        let (client, server) = duplex(64 * 1024);
        (
            FramedSession::start(client, WriterConfig::default()),
            Peer::new(server),
        )
    }

    #[tokio::test]
    async fn test_unary_response_routed_by_id() {
        let (session, mut peer) = session();

        let call = session.unary(PATH, Bytes::from_static(b"\x08\x01"));
        let server = async {
            let request = peer.next_frame().await;
            assert_eq!(request.kind().unwrap(), FrameKind::Request);
            assert_ne!(request.request_id(), RESERVED_REQUEST_ID);

            let (route, body) = split_request_payload(&request.payload).unwrap();
            assert_eq!(route, "/test.Echo/Echo");
            assert_eq!(&body[..], b"\x08\x01");

            peer.send(Frame::new(flags::RESPONSE, request.request_id(), body))
                .await;
        };

        let (response, ()) = tokio::join!(call, server);
        assert_eq!(&response.unwrap()[..], b"\x08\x01");
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_error_frame_becomes_status() {
        let (session, mut peer) = session();

        let call = session.unary(PATH, Bytes::new());
        let server = async {
            let request = peer.next_frame().await;
            let status = Status::not_found("no such catalog");
            peer.send(Frame::new(
                flags::ERROR_RESPONSE,
                request.request_id(),
                status.encode(),
            ))
            .await;
        };

        let (response, ()) = tokio::join!(call, server);
        let err = response.unwrap_err();
        assert_eq!(err.status().unwrap().code, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn test_stream_chunks_then_end() {
        let (session, mut peer) = session();

        let mut stream = session
            .server_streaming(PATH, Bytes::new())
            .await
            .unwrap();
        let request = peer.next_frame().await;
        let id = request.request_id();
        peer.send(Frame::new(flags::STREAM_CHUNK, id, Bytes::from_static(b"a")))
            .await;
        peer.send(Frame::new(flags::STREAM_CHUNK, id, Bytes::from_static(b"b")))
            .await;
        peer.send(Frame::empty(flags::STREAM_END_RESPONSE, id)).await;

        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"a");
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"b");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_sends_cancel() {
        let (session, mut peer) = session();

        let stream = session
            .server_streaming(PATH, Bytes::new())
            .await
            .unwrap();
        let request = peer.next_frame().await;
        drop(stream);

        let cancel = peer.next_frame().await;
        assert_eq!(cancel.kind().unwrap(), FrameKind::Cancel);
        assert_eq!(cancel.request_id(), request.request_id());
        assert_eq!(session.pending_calls(), 0);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending() {
        let (session, mut peer) = session();

        let call = session.unary(PATH, Bytes::new());
        let server = async {
            peer.next_frame().await;
            drop(peer);
        };

        let (response, ()) = tokio::join!(call, server);
        assert!(matches!(response, Err(ProtostubError::ConnectionClosed)));
        assert!(session.is_closed());
        assert!(matches!(
            session.unary(PATH, Bytes::new()).await,
            Err(ProtostubError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_local() {
        let (session, _peer) = session();
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(session
            .server_streaming(PATH, Bytes::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_released_call_sends_no_cancel() {
        let (session, mut peer) = session();

        let (tx, _rx) = oneshot::channel();
        let guard = session.register(Pending::Unary(tx)).unwrap();
        guard.release();
        drop(guard);
        assert_eq!(session.pending_calls(), 0);

        let call = session.unary(PATH, Bytes::new());
        let server = async {
            let first = peer.next_frame().await;
            assert_eq!(first.kind().unwrap(), FrameKind::Request);
            peer.send(Frame::new(flags::RESPONSE, first.request_id(), Bytes::new()))
                .await;
        };
        let (response, ()) = tokio::join!(call, server);
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_unsent_request_is_not_left_pending() {
        let (client, server) = duplex(1);
        let config = WriterConfig {
            channel_capacity: 1,
            send_timeout: std::time::Duration::from_millis(50),
        };
        let session = FramedSession::start(client, config);
        let mut peer = Peer::new(server);

        // The writer blocks on the first frame and the second fills the queue.
        let _first = session.server_streaming(PATH, Bytes::new()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let _second = session.server_streaming(PATH, Bytes::new()).await.unwrap();

        let third = session.server_streaming(PATH, Bytes::new()).await;
        assert!(matches!(third, Err(ProtostubError::BackpressureTimeout)));
        assert_eq!(session.pending_calls(), 2);

        let ids = [
            peer.next_frame().await.request_id(),
            peer.next_frame().await.request_id(),
        ];
        assert_eq!(ids, [1, 2]);
    }
}
