//! Generic typed client over a [`Transport`].

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tracing::trace;

use super::method::{StreamingMethod, UnaryMethod};
use super::{ByteStream, Transport};
use crate::codec::Message;
use crate::error::Result;

/// Encodes requests, delegates to a transport, decodes responses.
#[derive(Clone)]
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
}

impl ServiceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The transport this client sends through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Perform a unary call.
    pub async fn unary<Req: Message, Resp: Message>(
        &self,
        method: UnaryMethod<Req, Resp>,
        request: &Req,
    ) -> Result<Resp> {
        let path = method.path();
        trace!(%path, "unary call");
        let response = self.transport.unary(path, request.encode()).await?;
        Resp::decode(&response)
    }

    /// Start a server-streaming call.
    ///
    /// The returned stream yields one decoded message per received chunk.
    /// Dropping it cancels the call.
    pub async fn server_streaming<Req: Message, Resp: Message>(
        &self,
        method: StreamingMethod<Req, Resp>,
        request: &Req,
    ) -> Result<MessageStream<Resp>> {
        let path = method.path();
        trace!(%path, "server streaming call");
        let chunks = self.transport.server_streaming(path, request.encode()).await?;
        Ok(MessageStream::new(chunks))
    }
}

/// Decoded responses of a server-streaming call.
///
/// A chunk that fails to decode is yielded as an error; the stream itself
/// continues until the transport ends it.
pub struct MessageStream<M> {
    chunks: ByteStream,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message> MessageStream<M> {
    pub fn new(chunks: ByteStream) -> Self {
        Self {
            chunks,
            _marker: PhantomData,
        }
    }

    /// Next message, or `None` once the stream has ended.
    pub async fn message(&mut self) -> Result<Option<M>> {
        self.next().await.transpose()
    }
}

impl<M: Message> Stream for MessageStream<M> {
    type Item = Result<M>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .chunks
            .poll_next_unpin(cx)
            .map(|item| item.map(|chunk| chunk.and_then(|bytes| M::decode(&bytes))))
    }
}
