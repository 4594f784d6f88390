//! Protocol module - frame header, framing, and request layout.
//!
//! This module implements the binary frame protocol used by the bundled
//! transport:
//! - 9-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Request payloads carrying a route and an encoded message

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_request_payload, split_request_payload, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, FrameKind, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, RESERVED_REQUEST_ID,
};
