//! TCP implementation of [`Transport`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::session::FramedSession;
use crate::error::{ProtostubError, Result};
use crate::rpc::{BoxFuture, ByteStream, MethodPath, Transport};
use crate::writer::WriterConfig;

/// Framed-protocol transport over one TCP connection.
///
/// Construction performs no I/O. The connection is dialed by
/// [`connect`](Transport::connect) or by the first call, and redialed by the
/// next call after it is lost. After [`close`](Transport::close), calls fail
/// with [`ProtostubError::NotConnected`] until `connect` is called again.
pub struct TcpTransport {
    addr: String,
    config: WriterConfig,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    session: Option<Arc<FramedSession>>,
    closed: bool,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, WriterConfig::default())
    }

    pub fn with_config(addr: impl Into<String>, config: WriterConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Address this transport dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn session(&self) -> Result<Arc<FramedSession>> {
        let mut slot = self.slot.lock().await;
        if slot.closed {
            return Err(ProtostubError::NotConnected);
        }
        self.dial(&mut slot).await
    }

    async fn dial(&self, slot: &mut Slot) -> Result<Arc<FramedSession>> {
        if let Some(session) = slot.session.as_ref() {
            if !session.is_closed() {
                return Ok(session.clone());
            }
            debug!(addr = %self.addr, "session closed, redialing");
        }

        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        info!(addr = %self.addr, "connected");

        let session = Arc::new(FramedSession::start(stream, self.config.clone()));
        slot.session = Some(session.clone());
        Ok(session)
    }
}

impl Transport for TcpTransport {
    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            slot.closed = false;
            self.dial(&mut slot).await.map(drop)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            slot.closed = true;
            if let Some(session) = slot.session.take() {
                info!(addr = %self.addr, "closing connection");
                session.close();
            }
            Ok(())
        })
    }

    fn unary(&self, path: MethodPath, request: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { self.session().await?.unary(path, request).await })
    }

    fn server_streaming(
        &self,
        path: MethodPath,
        request: Bytes,
    ) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(async move {
            self.session()
                .await?
                .server_streaming(path, request)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtostubError;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_new_performs_no_io() {
        let transport = TcpTransport::new("127.0.0.1:1");
        assert_eq!(transport.addr(), "127.0.0.1:1");
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string());
        assert!(matches!(
            transport.connect().await,
            Err(ProtostubError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_reuses_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (_first, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let transport = TcpTransport::new(addr.to_string());
        transport.connect().await.unwrap();
        transport.connect().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_calls_after_close_fail_until_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                held.push(stream);
            }
        });

        let transport = TcpTransport::new(addr.to_string());
        transport.connect().await.unwrap();
        transport.close().await.unwrap();

        let path = MethodPath::new("catalog.CatalogService", "GetCatalog");
        let result = transport.unary(path, Bytes::new()).await;
        assert!(matches!(result, Err(ProtostubError::NotConnected)));
        assert!(matches!(
            transport.server_streaming(path, Bytes::new()).await,
            Err(ProtostubError::NotConnected)
        ));

        transport.connect().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 2);
        transport.close().await.unwrap();
    }
}
