//! Route table mapping method paths to typed handlers.
//!
//! # Example
//!
//! ```no_run
//! use protostub::handler::Router;
//! use protostub::rpc::Status;
//! use protostub::services::lambda::{InvokeRequest, InvokeResponse, INVOKE};
//!
//! let router = Router::new().unary(INVOKE, |req: InvokeRequest| async move {
//!     if req.name.is_empty() {
//!         return Err(Status::invalid_argument("name is required"));
//!     }
//!     Ok(InvokeResponse {
//!         payload: req.payload,
//!         ..InvokeResponse::default()
//!     })
//! });
//! assert!(router.contains("/lambda.LambdaService/Invoke"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use bytes::Bytes;
use tracing::{debug, trace};

use super::ResponseSink;
use crate::codec::Message;
use crate::error::{ProtostubError, Result};
use crate::rpc::{BoxFuture, Status, StreamingMethod, UnaryMethod};

/// Result type for handler invocations.
pub type HandlerResult = Result<()>;

/// Outcome of a typed handler.
pub type CallResult<T> = std::result::Result<T, Status>;

/// Object-safe handler over encoded requests.
pub trait Handler: Send + Sync + 'static {
    /// Handle one request, writing every response frame through `sink`.
    fn call(&self, request: Bytes, sink: ResponseSink) -> BoxFuture<'static, HandlerResult>;
}

/// Whether a route answers once or with a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStreaming,
}

/// Decodes the request, runs the handler, sends its response or status.
pub struct UnaryHandler<F, Req, Resp, Fut> {
    handler: F,
    _phantom: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> Handler for UnaryHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: Message,
    Resp: Message,
    Fut: Future<Output = CallResult<Resp>> + Send + 'static,
{
    fn call(&self, request: Bytes, sink: ResponseSink) -> BoxFuture<'static, HandlerResult> {
        let parsed = match Req::decode(&request) {
            Ok(v) => v,
            Err(e) => return reject(sink, e),
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            match fut.await {
                Ok(response) => sink.respond(&response).await,
                Err(status) => sink.error(&status).await,
            }
        })
    }
}

/// Decodes the request and runs a handler that streams through the sink.
///
/// The stream is ended when the handler returns `Ok`; an `Err` status is sent
/// instead of the end marker.
pub struct StreamingHandler<F, Req, Resp, Fut> {
    handler: F,
    _phantom: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> Handler for StreamingHandler<F, Req, Resp, Fut>
where
    F: Fn(Req, ResponseSink) -> Fut + Send + Sync + 'static,
    Req: Message,
    Resp: Message,
    Fut: Future<Output = CallResult<()>> + Send + 'static,
{
    fn call(&self, request: Bytes, sink: ResponseSink) -> BoxFuture<'static, HandlerResult> {
        let parsed = match Req::decode(&request) {
            Ok(v) => v,
            Err(e) => return reject(sink, e),
        };

        let fut = (self.handler)(parsed, sink.clone());
        Box::pin(async move {
            match fut.await {
                Ok(()) => sink.end().await,
                Err(status) => sink.error(&status).await,
            }
        })
    }
}

fn reject(sink: ResponseSink, err: ProtostubError) -> BoxFuture<'static, HandlerResult> {
    debug!(request_id = sink.request_id(), error = %err, "undecodable request");
    let status = Status::invalid_argument(err.to_string());
    Box::pin(async move { sink.error(&status).await })
}

struct Route {
    handler: Box<dyn Handler>,
    kind: MethodKind,
}

/// Handlers keyed by route `"/<service>/<method>"`.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary handler. A later registration for the same method
    /// replaces the earlier one.
    pub fn unary<F, Req, Resp, Fut>(mut self, method: UnaryMethod<Req, Resp>, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: Message,
        Resp: Message,
        Fut: Future<Output = CallResult<Resp>> + Send + 'static,
    {
        let handler = UnaryHandler {
            handler,
            _phantom: PhantomData,
        };
        self.insert(method.path().route(), MethodKind::Unary, Box::new(handler));
        self
    }

    /// Register a server-streaming handler.
    ///
    /// The handler sends messages with [`ResponseSink::chunk`].
    pub fn server_streaming<F, Req, Resp, Fut>(
        mut self,
        method: StreamingMethod<Req, Resp>,
        handler: F,
    ) -> Self
    where
        F: Fn(Req, ResponseSink) -> Fut + Send + Sync + 'static,
        Req: Message,
        Resp: Message,
        Fut: Future<Output = CallResult<()>> + Send + 'static,
    {
        let handler = StreamingHandler::<F, Req, Resp, Fut> {
            handler,
            _phantom: PhantomData,
        };
        self.insert(
            method.path().route(),
            MethodKind::ServerStreaming,
            Box::new(handler),
        );
        self
    }

    fn insert(&mut self, route: String, kind: MethodKind, handler: Box<dyn Handler>) {
        trace!(%route, ?kind, "registering handler");
        self.routes.insert(route, Route { handler, kind });
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn kind(&self, route: &str) -> Option<MethodKind> {
        self.routes.get(route).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the handler for `route`, or answer `UNIMPLEMENTED`.
    pub async fn dispatch(&self, route: &str, request: Bytes, sink: ResponseSink) -> Result<()> {
        match self.routes.get(route) {
            Some(entry) => entry.handler.call(request, sink).await,
            None => {
                debug!(%route, "no handler for route");
                sink.error(&Status::unimplemented(format!("Unknown method {route}")))
                    .await
            }
        }
    }
}
