//! Lambda service: invoke a named function with an opaque payload.

use bytes::Bytes;

use crate::codec::{
    expect_type, DynamicMessage, FieldDescriptor, Message, MessageDescriptor, SafeInt,
    ScalarKind, Value, ValueKind,
};
use crate::error::Result;
use crate::rpc::{ServiceClient, UnaryMethod};

pub const SERVICE: &str = "lambda.LambdaService";

pub const INVOKE: UnaryMethod<InvokeRequest, InvokeResponse> = UnaryMethod::new(SERVICE, "Invoke");

pub static INVOKE_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "lambda.InvokeRequest",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, ValueKind::Scalar(ScalarKind::String)),
        FieldDescriptor::new("name", "name", 2, ValueKind::Scalar(ScalarKind::String)),
        FieldDescriptor::new("payload", "payload", 3, ValueKind::Scalar(ScalarKind::Bytes)),
    ],
};

pub static INVOKE_RESPONSE: MessageDescriptor = MessageDescriptor {
    full_name: "lambda.InvokeResponse",
    fields: &[
        FieldDescriptor::new("payload", "payload", 1, ValueKind::Scalar(ScalarKind::Bytes)),
        FieldDescriptor::new(
            "duration_ms",
            "durationMs",
            2,
            ValueKind::Scalar(ScalarKind::UInt64),
        ),
    ],
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeRequest {
    pub namespace: String,
    pub name: String,
    pub payload: Bytes,
}

impl Message for InvokeRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &INVOKE_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&INVOKE_REQUEST);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::from(self.name.as_str()))
            .put(3, Value::Bytes(self.payload.clone()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
            name: msg.string(2),
            payload: msg.bytes(3),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeResponse {
    pub payload: Bytes,
    /// Execution time; never negative.
    pub duration_ms: SafeInt,
}

impl Message for InvokeResponse {
    fn descriptor() -> &'static MessageDescriptor {
        &INVOKE_RESPONSE
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&INVOKE_RESPONSE);
        msg.put(1, Value::Bytes(self.payload.clone()))
            .put(2, Value::I64(self.duration_ms));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            payload: msg.bytes(1),
            duration_ms: msg.int64(2),
        })
    }
}

/// Typed client for `lambda.LambdaService`.
#[derive(Clone)]
pub struct LambdaServiceClient {
    inner: ServiceClient,
}

impl LambdaServiceClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse> {
        self.inner.unary(INVOKE, request).await
    }
}
