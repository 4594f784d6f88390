//! Bundled service bindings.
//!
//! Each module holds the message descriptors, typed messages, method
//! constants and typed client of one protobuf package.

pub mod auth;
pub mod catalog;
pub mod lambda;

pub use auth::{AuthenticationServiceClient, PolicyServiceClient};
pub use catalog::CatalogServiceClient;
pub use lambda::LambdaServiceClient;
