//! Call outcome carried by error frames.

use std::fmt;

use crate::codec::{
    expect_type, DynamicMessage, EnumDescriptor, FieldDescriptor, Message, MessageDescriptor,
    ScalarKind, Value, ValueKind,
};
use crate::error::{ProtostubError, Result};

/// gRPC-compatible status codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Map a wire number; undeclared numbers become `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

static STATUS_CODE: EnumDescriptor = EnumDescriptor {
    full_name: "protostub.StatusCode",
    values: &[
        ("OK", 0),
        ("CANCELLED", 1),
        ("UNKNOWN", 2),
        ("INVALID_ARGUMENT", 3),
        ("DEADLINE_EXCEEDED", 4),
        ("NOT_FOUND", 5),
        ("ALREADY_EXISTS", 6),
        ("PERMISSION_DENIED", 7),
        ("RESOURCE_EXHAUSTED", 8),
        ("FAILED_PRECONDITION", 9),
        ("ABORTED", 10),
        ("OUT_OF_RANGE", 11),
        ("UNIMPLEMENTED", 12),
        ("INTERNAL", 13),
        ("UNAVAILABLE", 14),
        ("DATA_LOSS", 15),
        ("UNAUTHENTICATED", 16),
    ],
};

static STATUS: MessageDescriptor = MessageDescriptor {
    full_name: "protostub.Status",
    fields: &[
        FieldDescriptor::new("code", "code", 1, ValueKind::Enum(&STATUS_CODE)),
        FieldDescriptor::new("message", "message", 2, ValueKind::Scalar(ScalarKind::String)),
    ],
};

/// Failure reported by the remote side of a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }
}

/// Lets handlers use `?` on crate operations; a remote status passes through
/// unchanged, anything else becomes `INTERNAL`.
impl From<ProtostubError> for Status {
    fn from(err: ProtostubError) -> Self {
        match err {
            ProtostubError::Status(status) => status,
            other => Status::internal(other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Message for Status {
    fn descriptor() -> &'static MessageDescriptor {
        &STATUS
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&STATUS);
        msg.put(1, Value::Enum(self.code.as_i32()))
            .put(2, Value::String(self.message.clone()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            code: StatusCode::from_i32(msg.enum_value(1)),
            message: msg.string(2),
        })
    }
}
