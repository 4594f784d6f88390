//! Frame struct and request payload layout.
//!
//! A request payload is the route `"/<service>/<method>"` as a
//! length-delimited string, followed by the encoded request message:
//! ```text
//! ┌────────────┬────────────┬──────────────────┐
//! │ route len  │ route UTF-8│ message bytes    │
//! │ varint     │            │ (rest of payload)│
//! └────────────┴────────────┴──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use protostub::protocol::{build_request_payload, split_request_payload};
//!
//! let payload = build_request_payload("/demo.Echo/Say", b"\x0A\x02hi");
//! let (route, message) = split_request_payload(&payload).unwrap();
//! assert_eq!(route, "/demo.Echo/Say");
//! assert_eq!(&message[..], b"\x0A\x02hi");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{flags, FrameKind, Header, HEADER_SIZE};
use crate::codec::wire::{varint_len, write_length_delimited, WireReader};
use crate::error::{ProtostubError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame; the header's length is taken from `payload`.
    pub fn new(flags: u8, request_id: u32, payload: Bytes) -> Self {
        Self {
            header: Header::new(flags, request_id, payload.len() as u32),
            payload,
        }
    }

    /// Reassemble a frame read from the wire.
    pub fn from_parts(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Request frame carrying `route` and an encoded message.
    pub fn request(request_id: u32, route: &str, message: &[u8]) -> Self {
        Self::new(flags::REQUEST, request_id, build_request_payload(route, message))
    }

    /// Empty frame with the given flags (cancel, stream end).
    pub fn empty(flags: u8, request_id: u32) -> Self {
        Self::new(flags, request_id, Bytes::new())
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    #[inline]
    pub fn kind(&self) -> Result<FrameKind> {
        self.header.kind()
    }

    /// Total encoded size.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
    }
}

/// Build the payload of a request frame.
pub fn build_request_payload(route: &str, message: &[u8]) -> Bytes {
    let route_len = varint_len(route.len() as u64) + route.len();
    let mut buf = BytesMut::with_capacity(route_len + message.len());
    write_length_delimited(&mut buf, route.as_bytes());
    buf.put_slice(message);
    buf.freeze()
}

/// Split a request payload into its route and message bytes.
pub fn split_request_payload(payload: &Bytes) -> Result<(String, Bytes)> {
    let mut reader = WireReader::new(payload);
    let route = String::from_utf8(reader.read_length_delimited()?.to_vec())?;
    if !route.starts_with('/') {
        return Err(ProtostubError::Protocol(format!("Malformed route '{route}'")));
    }
    Ok((route, payload.slice(reader.position()..)))
}
