//! RPC dispatch layer.
//!
//! Typed service clients sit on top of one object-safe [`Transport`]
//! primitive that moves encoded bytes:
//!
//! ```text
//! CatalogServiceClient ─┐
//! LambdaServiceClient  ─┼─► ServiceClient ─► Arc<dyn Transport> ─► network
//! ...                  ─┘      encode/decode
//! ```

mod client;
mod dummy;
mod method;
mod status;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

pub use client::{MessageStream, ServiceClient};
pub use dummy::DummyTransport;
pub use method::{StreamingMethod, UnaryMethod};
pub use status::{Status, StatusCode};

/// Boxed future returned by object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Encoded response messages of a server-streaming call, one per item.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Fully qualified method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodPath {
    /// `<package>.<ServiceName>`.
    pub service: &'static str,
    pub method: &'static str,
}

impl MethodPath {
    pub const fn new(service: &'static str, method: &'static str) -> Self {
        Self { service, method }
    }

    /// Route string `"/<service>/<method>"`.
    pub fn route(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for MethodPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// Byte-level call primitive every service client delegates to.
///
/// Implementations must be usable from many tasks at once. `connect` and
/// `close` may be called more than once.
pub trait Transport: Send + Sync + 'static {
    /// Establish the underlying connection.
    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    /// Release the underlying connection.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// One request, one response.
    fn unary(&self, path: MethodPath, request: Bytes) -> BoxFuture<'_, Result<Bytes>>;

    /// One request, a stream of responses.
    fn server_streaming(
        &self,
        path: MethodPath,
        request: Bytes,
    ) -> BoxFuture<'_, Result<ByteStream>>;
}
