//! Reference [`Transport`](crate::rpc::Transport) over the frame protocol.
//!
//! [`FramedSession`] works on any async byte stream; [`TcpTransport`] dials
//! TCP and keeps one session per address.

mod session;
mod tcp;

pub(crate) use session::READ_BUFFER_SIZE;
pub use session::FramedSession;
pub use tcp::TcpTransport;
