//! Frame header encoding and decoding.
//!
//! Every frame starts with a 9-byte header:
//! ```text
//! ┌───────┬──────────┬──────────┐
//! │ Flags │ Req ID   │ Length   │
//! │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │       │ uint32 BE│ uint32 BE│
//! └───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{ProtostubError, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 9;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Request id that is never assigned to a call.
pub const RESERVED_REQUEST_ID: u32 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// Response (1) or request/cancel (0).
    pub const IS_RESPONSE: u8 = 0b0000_0001;
    /// Payload is an encoded `Status`.
    pub const IS_ERROR: u8 = 0b0000_0010;
    /// Part of a server stream.
    pub const IS_STREAM: u8 = 0b0000_0100;
    /// Final frame of a server stream; payload is empty.
    pub const STREAM_END: u8 = 0b0000_1000;
    /// Client abandons the call.
    pub const CANCEL: u8 = 0b0001_0000;

    /// Reserved bits mask (bits 5-7).
    pub const RESERVED_MASK: u8 = 0b1110_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Request flags.
    pub const REQUEST: u8 = 0;
    /// Single response: 0x01
    pub const RESPONSE: u8 = IS_RESPONSE;
    /// Error response: 0x03
    pub const ERROR_RESPONSE: u8 = IS_RESPONSE | IS_ERROR;
    /// Stream chunk: 0x05
    pub const STREAM_CHUNK: u8 = IS_RESPONSE | IS_STREAM;
    /// Stream end: 0x0D
    pub const STREAM_END_RESPONSE: u8 = IS_RESPONSE | IS_STREAM | STREAM_END;
}

/// What a frame means, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Cancel,
    Response,
    StreamChunk,
    StreamEnd,
    Error,
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Call identifier chosen by the client; 0 is reserved.
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    pub fn new(flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use protostub::protocol::{Header, flags};
    ///
    /// let bytes = Header::new(flags::RESPONSE, 42, 100).encode();
    /// assert_eq!(bytes, [0x01, 0, 0, 0, 42, 0, 0, 0, 100]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.flags;
        buf[1..5].copy_from_slice(&self.request_id.to_be_bytes());
        buf[5..9].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes. Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            flags: buf[0],
            request_id: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
            payload_length: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Request ID is not 0 (reserved)
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    /// - The flag combination names a known frame kind
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.request_id == RESERVED_REQUEST_ID {
            return Err(ProtostubError::Protocol(
                "Request ID 0 is reserved".to_string(),
            ));
        }

        if self.payload_length > max_payload_size {
            return Err(ProtostubError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ProtostubError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        self.kind().map(drop)
    }

    /// Classify the frame.
    pub fn kind(&self) -> Result<FrameKind> {
        let kind = match self.flags & !flags::RESERVED_MASK {
            flags::REQUEST => FrameKind::Request,
            flags::CANCEL => FrameKind::Cancel,
            flags::RESPONSE => FrameKind::Response,
            flags::STREAM_CHUNK => FrameKind::StreamChunk,
            flags::STREAM_END_RESPONSE => FrameKind::StreamEnd,
            f if f & flags::ERROR_RESPONSE == flags::ERROR_RESPONSE
                && f & flags::CANCEL == 0
                && f & flags::STREAM_END == 0 =>
            {
                FrameKind::Error
            }
            other => {
                return Err(ProtostubError::Protocol(format!(
                    "Invalid flag combination {other:#04x}"
                )))
            }
        };
        Ok(kind)
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }

    #[inline]
    pub fn is_stream_end(&self) -> bool {
        flags::has_flag(self.flags, flags::STREAM_END)
    }

    #[inline]
    pub fn is_cancel(&self) -> bool {
        flags::has_flag(self.flags, flags::CANCEL)
    }
}
