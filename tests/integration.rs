//! Integration tests for protostub.
//!
//! These tests drive typed clients against a served router, over in-memory
//! duplex streams and over TCP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::duplex;
use tokio::net::TcpListener;

use protostub::config::Endpoints;
use protostub::handler::{CallResult, ResponseSink, Router};
use protostub::protocol::{flags, Frame, FrameBuffer, FrameKind, HEADER_SIZE};
use protostub::rpc::{ServiceClient, Transport};
use protostub::server::{serve_connection, Server};
use protostub::services::auth::{
    AuthStatus, AuthenticateRequest, AuthenticateResponse, GetPolicyRequest, AUTHENTICATE,
};
use protostub::services::catalog::{
    Catalog, CreateCatalogRequest, GetCatalogRequest, ListCatalogsRequest, CREATE_CATALOG,
    GET_CATALOG, LIST_CATALOGS,
};
use protostub::services::lambda::InvokeRequest;
use protostub::services::{AuthenticationServiceClient, CatalogServiceClient, PolicyServiceClient};
use protostub::stub::{ServiceGroup, ServiceSelector, Stub};
use protostub::transport::{FramedSession, TcpTransport};
use protostub::writer::WriterConfig;
use protostub::{Message, ProtostubError, SafeInt, StatusCode};

/// Route library logs to the test writer; `RUST_LOG` overrides the level.
fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("protostub=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn catalog(namespace: &str, name: &str) -> Catalog {
    Catalog {
        namespace: namespace.to_string(),
        name: name.to_string(),
        public_name: name.to_uppercase(),
        version: SafeInt::from(3),
        ..Catalog::default()
    }
}

async fn list_catalogs(req: ListCatalogsRequest, sink: ResponseSink) -> CallResult<()> {
    // limit 0 streams until the client goes away
    let mut i = 0;
    while req.limit == 0 || i < req.limit {
        sink.chunk(&catalog(&req.namespace, &format!("cat{i}"))).await?;
        i += 1;
        if req.limit == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
    Ok(())
}

fn catalog_router() -> Router {
    Router::new()
        .unary(GET_CATALOG, |req: GetCatalogRequest| async move {
            if req.name == "missing" {
                return Err(protostub::Status::not_found(format!("{}/{}", req.namespace, req.name)));
            }
            Ok(catalog(&req.namespace, &req.name))
        })
        .unary(CREATE_CATALOG, |req: CreateCatalogRequest| async move {
            req.catalog
                .ok_or_else(|| protostub::Status::invalid_argument("catalog is required"))
        })
        .server_streaming(LIST_CATALOGS, list_catalogs)
}

fn full_router() -> Router {
    catalog_router().unary(AUTHENTICATE, |req: AuthenticateRequest| async move {
        let status = if req.password == "hunter2" {
            AuthStatus::Ok
        } else {
            AuthStatus::InvalidCredentials
        };
        Ok::<_, protostub::Status>(AuthenticateResponse {
            status,
            token: format!("token-{}", req.username),
            expires_at: None,
        })
    })
}

/// Client session connected to `router` through an in-memory stream.
fn in_memory(router: Router) -> Arc<FramedSession> {
    init_test_logging();
    let (client, server) = duplex(64 * 1024);
    tokio::spawn(serve_connection(server, router));
    Arc::new(FramedSession::start(client, WriterConfig::default()))
}

async fn tcp_server(router: Router) -> String {
    init_test_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = Server::new(router);
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// The documented catalog scenario encodes to a fixed byte sequence.
#[test]
fn test_catalog_scenario_bytes() {
    let scenario = Catalog {
        namespace: "ns1".to_string(),
        name: "cat".to_string(),
        public_name: "Cat".to_string(),
        version: SafeInt::from(3),
        ..Catalog::default()
    };
    let expected = [
        0x0A, 0x03, 0x6E, 0x73, 0x31, 0x12, 0x03, 0x63, 0x61, 0x74, 0x1A, 0x03, 0x43, 0x61,
        0x74, 0xB0, 0x06, 0x03,
    ];
    assert_eq!(&scenario.encode()[..], &expected);

    let decoded = Catalog::decode(&expected).unwrap();
    assert_eq!(decoded, scenario);
    assert!(decoded.created.is_none());
    assert!(decoded.updated.is_none());
}

/// Frames split at every byte boundary reassemble intact.
#[test]
fn test_fragmented_frame_parsing() {
    let mut wire = BytesMut::new();
    Frame::request(1, "/catalog.CatalogService/GetCatalog", b"\x0A\x01x").encode_into(&mut wire);
    Frame::empty(flags::STREAM_END_RESPONSE, 2).encode_into(&mut wire);
    Frame::new(flags::STREAM_CHUNK, 3, Bytes::from_static(b"chunk")).encode_into(&mut wire);

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for byte in wire.iter() {
        frames.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }

    assert!(buffer.is_empty());
    let kinds: Vec<_> = frames.iter().map(|f| f.kind().unwrap()).collect();
    assert_eq!(
        kinds,
        vec![FrameKind::Request, FrameKind::StreamEnd, FrameKind::StreamChunk]
    );
    assert_eq!(frames[2].size(), HEADER_SIZE + 5);
}

#[tokio::test]
async fn test_unary_over_duplex() {
    let client = CatalogServiceClient::new(ServiceClient::new(in_memory(catalog_router())));

    let request = GetCatalogRequest {
        namespace: "ns1".to_string(),
        name: "cat".to_string(),
    };
    let response = client.get_catalog(&request).await.unwrap();
    assert_eq!(response, catalog("ns1", "cat"));

    let created = client
        .create_catalog(&CreateCatalogRequest {
            catalog: Some(catalog("ns2", "dog")),
        })
        .await
        .unwrap();
    assert_eq!(created.public_name, "DOG");
}

#[tokio::test]
async fn test_status_error_propagates() {
    let client = CatalogServiceClient::new(ServiceClient::new(in_memory(catalog_router())));

    let err = client
        .get_catalog(&GetCatalogRequest {
            namespace: "ns1".to_string(),
            name: "missing".to_string(),
        })
        .await
        .unwrap_err();
    let status = err.status().unwrap();
    assert_eq!(status.code, StatusCode::NotFound);
    assert_eq!(status.message, "ns1/missing");

    let err = client
        .create_catalog(&CreateCatalogRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.status().unwrap().code, StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_unimplemented_route() {
    let policy = PolicyServiceClient::new(ServiceClient::new(in_memory(catalog_router())));

    let err = policy
        .get_policy(&GetPolicyRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.status().unwrap().code, StatusCode::Unimplemented);
}

#[tokio::test]
async fn test_streaming_over_duplex() {
    let client = CatalogServiceClient::new(ServiceClient::new(in_memory(catalog_router())));

    let stream = client
        .list_catalogs(&ListCatalogsRequest {
            namespace: "ns1".to_string(),
            limit: 4,
        })
        .await
        .unwrap();
    let names: Vec<String> = stream.map(|c| c.unwrap().name).collect().await;
    assert_eq!(names, vec!["cat0", "cat1", "cat2", "cat3"]);
}

/// Dropping a stream cancels only that call; the connection stays usable.
#[tokio::test]
async fn test_stream_cancel_keeps_connection() {
    let session = in_memory(catalog_router());
    let client = CatalogServiceClient::new(ServiceClient::new(session.clone()));

    let mut endless = client
        .list_catalogs(&ListCatalogsRequest {
            namespace: "ns1".to_string(),
            limit: 0,
        })
        .await
        .unwrap();
    let first = endless.message().await.unwrap().unwrap();
    assert_eq!(first.name, "cat0");
    drop(endless);
    assert_eq!(session.pending_calls(), 0);

    let request = GetCatalogRequest {
        namespace: "ns1".to_string(),
        name: "after".to_string(),
    };
    assert_eq!(client.get_catalog(&request).await.unwrap().name, "after");
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_concurrent_calls_share_session() {
    let client = CatalogServiceClient::new(ServiceClient::new(in_memory(catalog_router())));

    let calls = (0..16).map(|i| {
        let client = client.clone();
        async move {
            let request = GetCatalogRequest {
                namespace: "ns".to_string(),
                name: format!("c{i}"),
            };
            client.get_catalog(&request).await.unwrap().name
        }
    });
    let names = futures::future::join_all(calls).await;
    let expected: Vec<String> = (0..16).map(|i| format!("c{i}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_tcp_transport_roundtrip() {
    let addr = tcp_server(full_router()).await;
    let transport = Arc::new(TcpTransport::new(addr));
    let auth = AuthenticationServiceClient::new(ServiceClient::new(transport.clone()));

    // No explicit connect: the first call dials.
    let response = auth
        .authenticate(&AuthenticateRequest {
            username: "ada".to_string(),
            password: "hunter2".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.status, AuthStatus::Ok);
    assert_eq!(response.token, "token-ada");

    transport.close().await.unwrap();
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_stub_over_tcp() {
    let addr = tcp_server(full_router()).await;
    let stub = Stub::builder()
        .select(ServiceSelector::only([ServiceGroup::Catalog, ServiceGroup::Auth]))
        .endpoints(Endpoints {
            catalog: addr.clone(),
            auth: addr.clone(),
            lambda: addr,
        })
        .build();
    assert_eq!(stub.connection_count(), 1);

    stub.connect().await.unwrap();

    let request = GetCatalogRequest {
        namespace: "ns1".to_string(),
        name: "cat".to_string(),
    };
    assert_eq!(stub.catalog().get_catalog(&request).await.unwrap().public_name, "CAT");

    let response = stub
        .authentication()
        .authenticate(&AuthenticateRequest {
            username: "bob".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.status, AuthStatus::InvalidCredentials);

    let err = stub.lambda().invoke(&InvokeRequest::default()).await.unwrap_err();
    assert!(matches!(err, ProtostubError::ServiceDisabled(_)));

    stub.close().await.unwrap();
}

/// One connector invocation per distinct address, none for dummy groups.
#[tokio::test]
async fn test_stub_connector_invocations() {
    let addr = tcp_server(full_router()).await;
    let created = Arc::new(AtomicUsize::new(0));

    let counter = created.clone();
    let stub = Stub::builder()
        .select(ServiceSelector::all().without(ServiceGroup::Lambda))
        .endpoints(Endpoints::uniform(addr))
        .connector(move |addr: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(TcpTransport::new(addr)) as Arc<dyn Transport>
        })
        .build();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(stub.connection_count(), 1);
    assert!(Arc::ptr_eq(
        stub.transport(ServiceGroup::Catalog),
        stub.transport(ServiceGroup::Auth)
    ));

    stub.connect().await.unwrap();
    stub.close().await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_closing_fails_pending_call() {
    let (client, server) = duplex(64 * 1024);
    let session = FramedSession::start(client, WriterConfig::default());

    // Read the request, then hang up without answering.
    let peer = tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut server = server;
        let mut buf = [0u8; 256];
        let _ = server.read(&mut buf).await;
    });

    let path = GET_CATALOG.path();
    let result = session.unary(path, GetCatalogRequest::default().encode()).await;
    assert!(matches!(result, Err(ProtostubError::ConnectionClosed)));
    peer.await.unwrap();
}
