//! Inert transport for services that were not selected.

use bytes::Bytes;
use tracing::trace;

use super::{BoxFuture, ByteStream, MethodPath, Transport};
use crate::error::{ProtostubError, Result};

/// Stand-in transport that performs no I/O.
///
/// `connect` and `close` succeed without doing anything; every call fails
/// locally with [`ProtostubError::ServiceDisabled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyTransport;

impl DummyTransport {
    fn disabled(path: MethodPath) -> ProtostubError {
        trace!(%path, "call on disabled service");
        ProtostubError::ServiceDisabled(path.service.to_string())
    }
}

impl Transport for DummyTransport {
    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn unary(&self, path: MethodPath, _request: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { Err(Self::disabled(path)) })
    }

    fn server_streaming(
        &self,
        path: MethodPath,
        _request: Bytes,
    ) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(async move { Err(Self::disabled(path)) })
    }
}
