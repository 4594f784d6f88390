//! Multi-service stub.
//!
//! A [`Stub`] binds every bundled service client to a transport. Service
//! groups that point at the same address share one transport; groups left
//! out of the [`ServiceSelector`] get the shared [`DummyTransport`] and never
//! touch the network.
//!
//! ```text
//! catalog ──► "10.0.0.1:50051" ─┐
//! auth    ──► "10.0.0.1:50051" ─┴─► TcpTransport #1
//! lambda  ──► (not selected)    ───► DummyTransport
//! ```
//!
//! # Example
//!
//! ```no_run
//! use protostub::config::Endpoints;
//! use protostub::services::catalog::GetCatalogRequest;
//! use protostub::stub::{ServiceGroup, ServiceSelector, Stub};
//!
//! # async fn run() -> protostub::Result<()> {
//! let stub = Stub::builder()
//!     .select(ServiceSelector::only([ServiceGroup::Catalog]))
//!     .endpoints(Endpoints::uniform("10.0.0.1:50051"))
//!     .build();
//!
//! stub.connect().await?;
//! let request = GetCatalogRequest {
//!     namespace: "ns1".to_string(),
//!     name: "cat".to_string(),
//! };
//! let catalog = stub.catalog().get_catalog(&request).await?;
//! println!("{}", catalog.public_name);
//! stub.close().await
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Endpoints;
use crate::error::{ProtostubError, Result};
use crate::rpc::{DummyTransport, ServiceClient, Transport};
use crate::services::{
    AuthenticationServiceClient, CatalogServiceClient, LambdaServiceClient, PolicyServiceClient,
};
use crate::transport::TcpTransport;
use crate::writer::WriterConfig;

/// A set of services reached through one endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceGroup {
    /// `catalog.CatalogService`.
    Catalog,
    /// `auth.AuthenticationService` and `auth.PolicyService`.
    Auth,
    /// `lambda.LambdaService`.
    Lambda,
}

impl ServiceGroup {
    pub const ALL: [ServiceGroup; 3] = [
        ServiceGroup::Catalog,
        ServiceGroup::Auth,
        ServiceGroup::Lambda,
    ];

    fn index(self) -> usize {
        match self {
            ServiceGroup::Catalog => 0,
            ServiceGroup::Auth => 1,
            ServiceGroup::Lambda => 2,
        }
    }

    fn address(self, endpoints: &Endpoints) -> &str {
        match self {
            ServiceGroup::Catalog => &endpoints.catalog,
            ServiceGroup::Auth => &endpoints.auth,
            ServiceGroup::Lambda => &endpoints.lambda,
        }
    }
}

/// Service groups that get a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSelector {
    selected: [bool; 3],
}

impl ServiceSelector {
    /// Every group.
    pub const fn all() -> Self {
        Self { selected: [true; 3] }
    }

    /// No group; every client fails locally.
    pub const fn none() -> Self {
        Self {
            selected: [false; 3],
        }
    }

    /// Exactly the given groups.
    pub fn only<I: IntoIterator<Item = ServiceGroup>>(groups: I) -> Self {
        groups.into_iter().fold(Self::none(), Self::with)
    }

    pub fn with(mut self, group: ServiceGroup) -> Self {
        self.selected[group.index()] = true;
        self
    }

    pub fn without(mut self, group: ServiceGroup) -> Self {
        self.selected[group.index()] = false;
        self
    }

    pub fn contains(&self, group: ServiceGroup) -> bool {
        self.selected[group.index()]
    }
}

impl Default for ServiceSelector {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<ServiceGroup> for ServiceSelector {
    fn from_iter<I: IntoIterator<Item = ServiceGroup>>(iter: I) -> Self {
        Self::only(iter)
    }
}

/// Creates the transport for an endpoint address. Called at most once per
/// distinct address.
pub type Connector = Arc<dyn Fn(&str) -> Arc<dyn Transport> + Send + Sync>;

/// Builder for a [`Stub`].
pub struct StubBuilder {
    selector: ServiceSelector,
    endpoints: Option<Endpoints>,
    connector: Option<Connector>,
    writer_config: WriterConfig,
}

impl StubBuilder {
    pub fn new() -> Self {
        Self {
            selector: ServiceSelector::all(),
            endpoints: None,
            connector: None,
            writer_config: WriterConfig::default(),
        }
    }

    /// Choose the groups that get live connections.
    ///
    /// Default: all groups
    pub fn select(mut self, selector: ServiceSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set the address of each group.
    ///
    /// Default: [`Endpoints::from_env`]
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Replace the transport factory.
    ///
    /// Default: a [`TcpTransport`] per address
    pub fn connector<F>(mut self, connector: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn Transport> + Send + Sync + 'static,
    {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Writer settings for the default TCP connector.
    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.writer_config = config;
        self
    }

    /// Create the transports and clients. Performs no I/O.
    pub fn build(self) -> Stub {
        let endpoints = self.endpoints.unwrap_or_else(Endpoints::from_env);
        let connector: Connector = match self.connector {
            Some(connector) => connector,
            None => {
                let config = self.writer_config;
                Arc::new(move |addr: &str| {
                    Arc::new(TcpTransport::with_config(addr, config.clone())) as Arc<dyn Transport>
                })
            }
        };

        let dummy: Arc<dyn Transport> = Arc::new(DummyTransport);
        let mut connections: Vec<Connection> = Vec::new();
        let mut transports: Vec<Arc<dyn Transport>> = Vec::with_capacity(ServiceGroup::ALL.len());

        for group in ServiceGroup::ALL {
            if !self.selector.contains(group) {
                debug!(?group, "service group not selected");
                transports.push(dummy.clone());
                continue;
            }

            let addr = group.address(&endpoints);
            let transport = match connections.iter().find(|c| c.addr == addr) {
                Some(existing) => existing.transport.clone(),
                None => {
                    debug!(?group, %addr, "creating connection");
                    let transport = connector(addr);
                    connections.push(Connection {
                        addr: addr.to_string(),
                        transport: transport.clone(),
                    });
                    transport
                }
            };
            transports.push(transport);
        }

        let client = |group: ServiceGroup| ServiceClient::new(transports[group.index()].clone());
        Stub {
            catalog: CatalogServiceClient::new(client(ServiceGroup::Catalog)),
            authentication: AuthenticationServiceClient::new(client(ServiceGroup::Auth)),
            policy: PolicyServiceClient::new(client(ServiceGroup::Auth)),
            lambda: LambdaServiceClient::new(client(ServiceGroup::Lambda)),
            transports,
            connections,
            endpoints,
            selector: self.selector,
        }
    }
}

impl Default for StubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    addr: String,
    transport: Arc<dyn Transport>,
}

/// Typed clients for every bundled service over a minimal set of
/// connections.
///
/// The stub owns its connections; [`close`](Stub::close) releases each one
/// exactly once.
pub struct Stub {
    catalog: CatalogServiceClient,
    authentication: AuthenticationServiceClient,
    policy: PolicyServiceClient,
    lambda: LambdaServiceClient,
    transports: Vec<Arc<dyn Transport>>,
    connections: Vec<Connection>,
    endpoints: Endpoints,
    selector: ServiceSelector,
}

impl Stub {
    pub fn builder() -> StubBuilder {
        StubBuilder::new()
    }

    /// Connect every distinct connection, one at a time in first-use order.
    ///
    /// Stops at the first failure and returns it.
    pub async fn connect(&self) -> Result<()> {
        for conn in &self.connections {
            debug!(addr = %conn.addr, "connecting");
            conn.transport.connect().await?;
        }
        Ok(())
    }

    /// Close every distinct connection once.
    ///
    /// Safe before, after or without `connect`. Keeps going past failures
    /// and returns the first one.
    pub async fn close(&self) -> Result<()> {
        let mut first_error: Option<ProtostubError> = None;
        for conn in &self.connections {
            debug!(addr = %conn.addr, "closing");
            if let Err(e) = conn.transport.close().await {
                warn!(addr = %conn.addr, error = %e, "close failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn catalog(&self) -> &CatalogServiceClient {
        &self.catalog
    }

    pub fn authentication(&self) -> &AuthenticationServiceClient {
        &self.authentication
    }

    pub fn policy(&self) -> &PolicyServiceClient {
        &self.policy
    }

    pub fn lambda(&self) -> &LambdaServiceClient {
        &self.lambda
    }

    /// Transport backing `group`; the shared dummy if it was not selected.
    pub fn transport(&self, group: ServiceGroup) -> &Arc<dyn Transport> {
        &self.transports[group.index()]
    }

    /// Number of distinct live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn selector(&self) -> ServiceSelector {
        self.selector
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("selector", &self.selector)
            .field(
                "connections",
                &self.connections.iter().map(|c| c.addr.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
