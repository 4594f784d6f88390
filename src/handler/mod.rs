//! Server-side request handling.
//!
//! Provides:
//! - [`Router`] - maps routes to typed handlers
//! - [`ResponseSink`] - lets handlers respond, stream and fail calls

mod context;
mod registry;

pub use context::ResponseSink;
pub use registry::{CallResult, Handler, HandlerResult, MethodKind, Router};
