//! Server builder and connection loop.
//!
//! The [`ServerBuilder`] configures limits and the [`Server`] runs each
//! connection:
//! 1. Split the stream and spawn the writer task
//! 2. Read frames and route requests to handlers
//! 3. Abort handlers on `CANCEL` or when the connection ends
//!
//! # Example
//!
//! ```no_run
//! use protostub::handler::Router;
//! use protostub::rpc::Status;
//! use protostub::server::Server;
//! use protostub::services::catalog::{Catalog, GetCatalogRequest, GET_CATALOG};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new().unary(GET_CATALOG, |req: GetCatalogRequest| async move {
//!         Ok::<_, Status>(Catalog {
//!             namespace: req.namespace,
//!             name: req.name,
//!             ..Catalog::default()
//!         })
//!     });
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:50051").await?;
//!     Server::builder(router)
//!         .max_concurrent_handlers(64)
//!         .build()
//!         .serve(listener)
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ProtostubError, Result};
use crate::handler::{ResponseSink, Router};
use crate::protocol::{
    split_request_payload, Frame, FrameBuffer, FrameKind, DEFAULT_MAX_PAYLOAD_SIZE,
};
use crate::rpc::Status;
use crate::transport::READ_BUFFER_SIZE;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default maximum concurrent handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Builder for a [`Server`].
pub struct ServerBuilder {
    router: Router,
    writer_config: WriterConfig,
    max_concurrent_handlers: usize,
    max_payload_size: u32,
}

impl ServerBuilder {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            writer_config: WriterConfig::default(),
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the maximum number of handlers running at once, across all
    /// connections.
    ///
    /// When this limit is reached, new requests are answered with
    /// `RESOURCE_EXHAUSTED`.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    /// Set the largest accepted request payload.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the writer channel capacity of each connection.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Set how long a handler waits for room in the writer channel.
    ///
    /// Default: 5 seconds
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.writer_config.send_timeout = timeout;
        self
    }

    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(Inner {
                router: self.router,
                writer_config: self.writer_config,
                max_payload_size: self.max_payload_size,
                semaphore: Arc::new(Semaphore::new(self.max_concurrent_handlers)),
            }),
        }
    }
}

struct Inner {
    router: Router,
    writer_config: WriterConfig,
    max_payload_size: u32,
    semaphore: Arc<Semaphore>,
}

/// Serves a [`Router`] over framed connections.
///
/// Cheap to clone; clones share the router and the handler limit.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn builder(router: Router) -> ServerBuilder {
        ServerBuilder::new(router)
    }

    /// Server with default limits.
    pub fn new(router: Router) -> Self {
        ServerBuilder::new(router).build()
    }

    /// Accept TCP connections and serve each on its own task.
    ///
    /// Returns only if accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "serving");
        loop {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            debug!(%peer, "accepted connection");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(stream).await {
                    error!("Connection {} failed: {}", peer, e);
                }
                debug!(%peer, "connection finished");
            });
        }
    }

    /// Serve one connection until the peer closes it.
    pub async fn serve_connection<IO>(&self, io: IO) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(io);
        let (writer, _writer_task) = spawn_writer_task(write_half, self.inner.writer_config.clone());

        let mut frame_buffer = FrameBuffer::with_max_payload(self.inner.max_payload_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut running: HashMap<u32, JoinHandle<()>> = HashMap::new();

        let result = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(ProtostubError::Io(e)),
            };

            let frames = match frame_buffer.push(&buf[..n]) {
                Ok(frames) => frames,
                Err(e) => break Err(e),
            };

            for frame in frames {
                self.dispatch_frame(frame, &writer, &mut running);
            }
        };

        for (_, task) in running.drain() {
            task.abort();
        }
        result
    }

    /// Route a single inbound frame.
    fn dispatch_frame(
        &self,
        frame: Frame,
        writer: &WriterHandle,
        running: &mut HashMap<u32, JoinHandle<()>>,
    ) {
        let request_id = frame.request_id();
        match frame.kind() {
            Ok(FrameKind::Request) => {}
            Ok(FrameKind::Cancel) => {
                if let Some(task) = running.remove(&request_id) {
                    debug!(request_id, "cancelling handler");
                    task.abort();
                }
                return;
            }
            Ok(kind) => {
                warn!(request_id, ?kind, "unexpected frame on server connection");
                return;
            }
            Err(e) => {
                warn!(request_id, error = %e, "dropping invalid frame");
                return;
            }
        }

        running.retain(|_, task| !task.is_finished());
        let sink = ResponseSink::with_writer(request_id, writer.clone());

        let (route, request) = match split_request_payload(&frame.payload) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(request_id, error = %e, "malformed request");
                reply_status(sink, Status::invalid_argument(e.to_string()));
                return;
            }
        };

        let permit = match self.inner.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                warn!(request_id, %route, "Handler capacity reached, rejecting request");
                reply_status(sink, Status::resource_exhausted("handler capacity reached"));
                return;
            }
        };

        let server = self.clone();
        let task = tokio::spawn(async move {
            // Permit is held until this task completes
            let _permit = permit;
            if let Err(e) = server.inner.router.dispatch(&route, request, sink).await {
                error!("Handler error for {}: {}", route, e);
            }
        });
        running.insert(request_id, task);
    }
}

fn reply_status(sink: ResponseSink, status: Status) {
    tokio::spawn(async move {
        if let Err(e) = sink.error(&status).await {
            debug!(request_id = sink.request_id(), error = %e, "status not sent");
        }
    });
}

/// Serve one connection with default limits.
pub async fn serve_connection<IO>(io: IO, router: Router) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    Server::new(router).serve_connection(io).await
}
