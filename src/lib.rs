//! # protostub
//!
//! Runtime for protobuf-style service bindings: a schema-driven binary and
//! JSON message codec, typed service clients, and a stub that spreads those
//! clients over as few connections as possible.
//!
//! ## Architecture
//!
//! - **Codec** ([`codec`]): wire primitives plus one engine driven by static
//!   descriptor tables; typed structs implement [`Message`]
//! - **Dispatch** ([`rpc`], [`services`]): typed clients over an object-safe
//!   [`Transport`](rpc::Transport)
//! - **Stub** ([`stub`]): one transport per distinct address, inert clients
//!   for services that were not selected
//! - **Frame protocol** ([`protocol`], [`transport`], [`server`]): a reference
//!   transport over TCP and a router to serve it
//!
//! ## Example
//!
//! ```no_run
//! use protostub::services::lambda::InvokeRequest;
//! use protostub::stub::{ServiceGroup, ServiceSelector, Stub};
//!
//! #[tokio::main]
//! async fn main() -> protostub::Result<()> {
//!     let stub = Stub::builder()
//!         .select(ServiceSelector::only([ServiceGroup::Lambda]))
//!         .build();
//!     stub.connect().await?;
//!
//!     let response = stub
//!         .lambda()
//!         .invoke(&InvokeRequest {
//!             namespace: "ns1".to_string(),
//!             name: "resize".to_string(),
//!             payload: bytes::Bytes::from_static(b"{}"),
//!         })
//!         .await?;
//!     println!("took {}ms", response.duration_ms);
//!
//!     stub.close().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod services;
pub mod stub;
pub mod transport;
pub mod writer;

pub use codec::{DynamicMessage, Message, SafeInt};
pub use error::{ProtostubError, Result};
pub use rpc::{Status, StatusCode, Transport};
pub use server::{Server, ServerBuilder};
pub use stub::{Stub, StubBuilder};
