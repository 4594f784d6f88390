//! Authentication and policy services.
//!
//! Both live in the `auth` package and share one endpoint.

use chrono::{DateTime, Utc};

use crate::codec::{
    expect_type, DynamicMessage, EnumDescriptor, FieldDescriptor, Message, MessageDescriptor,
    ScalarKind, Value, ValueKind, UNRECOGNIZED,
};
use crate::error::Result;
use crate::rpc::{MessageStream, ServiceClient, StreamingMethod, UnaryMethod};

pub const AUTHENTICATION_SERVICE: &str = "auth.AuthenticationService";
pub const POLICY_SERVICE: &str = "auth.PolicyService";

pub const AUTHENTICATE: UnaryMethod<AuthenticateRequest, AuthenticateResponse> =
    UnaryMethod::new(AUTHENTICATION_SERVICE, "Authenticate");
pub const REFRESH_TOKEN: UnaryMethod<RefreshTokenRequest, RefreshTokenResponse> =
    UnaryMethod::new(AUTHENTICATION_SERVICE, "RefreshToken");
pub const GET_POLICY: UnaryMethod<GetPolicyRequest, Policy> =
    UnaryMethod::new(POLICY_SERVICE, "GetPolicy");
pub const LIST_POLICIES: StreamingMethod<ListPoliciesRequest, Policy> =
    StreamingMethod::new(POLICY_SERVICE, "ListPolicies");

const STRING: ValueKind = ValueKind::Scalar(ScalarKind::String);
const BOOL: ValueKind = ValueKind::Scalar(ScalarKind::Bool);

pub static AUTH_STATUS: EnumDescriptor = EnumDescriptor {
    full_name: "auth.AuthStatus",
    values: &[
        ("AUTH_STATUS_UNSPECIFIED", 0),
        ("AUTH_STATUS_OK", 1),
        ("AUTH_STATUS_INVALID_CREDENTIALS", 2),
        ("AUTH_STATUS_LOCKED", 3),
    ],
};

pub static REFRESH_STATUS: EnumDescriptor = EnumDescriptor {
    full_name: "auth.RefreshStatus",
    values: &[
        ("REFRESH_STATUS_UNSPECIFIED", 0),
        ("REFRESH_STATUS_OK", 1),
        ("REFRESH_STATUS_EXPIRED", 2),
        ("REFRESH_STATUS_REVOKED", 3),
    ],
};

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    Unspecified,
    Ok,
    InvalidCredentials,
    Locked,
    /// A number this build does not know.
    Unrecognized,
}

impl AuthStatus {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => AuthStatus::Unspecified,
            1 => AuthStatus::Ok,
            2 => AuthStatus::InvalidCredentials,
            3 => AuthStatus::Locked,
            _ => AuthStatus::Unrecognized,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            AuthStatus::Unspecified => 0,
            AuthStatus::Ok => 1,
            AuthStatus::InvalidCredentials => 2,
            AuthStatus::Locked => 3,
            AuthStatus::Unrecognized => UNRECOGNIZED,
        }
    }
}

/// Outcome of a token refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshStatus {
    #[default]
    Unspecified,
    Ok,
    Expired,
    Revoked,
    Unrecognized,
}

impl RefreshStatus {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => RefreshStatus::Unspecified,
            1 => RefreshStatus::Ok,
            2 => RefreshStatus::Expired,
            3 => RefreshStatus::Revoked,
            _ => RefreshStatus::Unrecognized,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            RefreshStatus::Unspecified => 0,
            RefreshStatus::Ok => 1,
            RefreshStatus::Expired => 2,
            RefreshStatus::Revoked => 3,
            RefreshStatus::Unrecognized => UNRECOGNIZED,
        }
    }
}

pub static AUTHENTICATE_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "auth.AuthenticateRequest",
    fields: &[
        FieldDescriptor::new("username", "username", 1, STRING),
        FieldDescriptor::new("password", "password", 2, STRING),
    ],
};

pub static AUTHENTICATE_RESPONSE: MessageDescriptor = MessageDescriptor {
    full_name: "auth.AuthenticateResponse",
    fields: &[
        FieldDescriptor::new("status", "status", 1, ValueKind::Enum(&AUTH_STATUS)),
        FieldDescriptor::new("token", "token", 2, STRING),
        FieldDescriptor::new("expires_at", "expiresAt", 3, ValueKind::Timestamp),
    ],
};

pub static REFRESH_TOKEN_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "auth.RefreshTokenRequest",
    fields: &[FieldDescriptor::new("token", "token", 1, STRING)],
};

pub static REFRESH_TOKEN_RESPONSE: MessageDescriptor = MessageDescriptor {
    full_name: "auth.RefreshTokenResponse",
    fields: &[
        FieldDescriptor::new("status", "status", 1, ValueKind::Enum(&REFRESH_STATUS)),
        FieldDescriptor::new("token", "token", 2, STRING),
        FieldDescriptor::new("expires_at", "expiresAt", 3, ValueKind::Timestamp),
    ],
};

pub static POLICY: MessageDescriptor = MessageDescriptor {
    full_name: "auth.Policy",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, STRING),
        FieldDescriptor::new("name", "name", 2, STRING),
        FieldDescriptor::new("catalog_rule", "catalogRule", 3, ValueKind::Message(&CATALOG_RULE))
            .in_group("rule"),
        FieldDescriptor::new("lambda_rule", "lambdaRule", 4, ValueKind::Message(&LAMBDA_RULE))
            .in_group("rule"),
        FieldDescriptor::new("actions", "actions", 5, STRING).repeated(),
    ],
};

pub static CATALOG_RULE: MessageDescriptor = MessageDescriptor {
    full_name: "auth.CatalogRule",
    fields: &[
        FieldDescriptor::new("catalog_name", "catalogName", 1, STRING),
        FieldDescriptor::new("read", "read", 2, BOOL),
        FieldDescriptor::new("write", "write", 3, BOOL),
    ],
};

pub static LAMBDA_RULE: MessageDescriptor = MessageDescriptor {
    full_name: "auth.LambdaRule",
    fields: &[
        FieldDescriptor::new("lambda_name", "lambdaName", 1, STRING),
        FieldDescriptor::new("invoke", "invoke", 2, BOOL),
    ],
};

pub static GET_POLICY_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "auth.GetPolicyRequest",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, STRING),
        FieldDescriptor::new("name", "name", 2, STRING),
    ],
};

pub static LIST_POLICIES_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "auth.ListPoliciesRequest",
    fields: &[FieldDescriptor::new("namespace", "namespace", 1, STRING)],
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

impl Message for AuthenticateRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &AUTHENTICATE_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&AUTHENTICATE_REQUEST);
        msg.put(1, Value::from(self.username.as_str()))
            .put(2, Value::from(self.password.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            username: msg.string(1),
            password: msg.string(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticateResponse {
    pub status: AuthStatus,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message for AuthenticateResponse {
    fn descriptor() -> &'static MessageDescriptor {
        &AUTHENTICATE_RESPONSE
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&AUTHENTICATE_RESPONSE);
        msg.put(1, Value::Enum(self.status.as_i32()))
            .put(2, Value::from(self.token.as_str()));
        if let Some(expires_at) = self.expires_at {
            msg.put(3, Value::Timestamp(expires_at));
        }
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            status: AuthStatus::from_i32(msg.enum_value(1)),
            token: msg.string(2),
            expires_at: msg.timestamp(3),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshTokenRequest {
    pub token: String,
}

impl Message for RefreshTokenRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &REFRESH_TOKEN_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&REFRESH_TOKEN_REQUEST);
        msg.put(1, Value::from(self.token.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            token: msg.string(1),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshTokenResponse {
    pub status: RefreshStatus,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message for RefreshTokenResponse {
    fn descriptor() -> &'static MessageDescriptor {
        &REFRESH_TOKEN_RESPONSE
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&REFRESH_TOKEN_RESPONSE);
        msg.put(1, Value::Enum(self.status.as_i32()))
            .put(2, Value::from(self.token.as_str()));
        if let Some(expires_at) = self.expires_at {
            msg.put(3, Value::Timestamp(expires_at));
        }
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            status: RefreshStatus::from_i32(msg.enum_value(1)),
            token: msg.string(2),
            expires_at: msg.timestamp(3),
        })
    }
}

/// Access policy bound to one catalog or one lambda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    pub namespace: String,
    pub name: String,
    pub rule: Option<PolicyRule>,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyRule {
    Catalog(CatalogRule),
    Lambda(LambdaRule),
}

impl Message for Policy {
    fn descriptor() -> &'static MessageDescriptor {
        &POLICY
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&POLICY);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::from(self.name.as_str()))
            .put(
                5,
                Value::list(self.actions.iter().map(|a| Value::from(a.as_str()))),
            );
        match &self.rule {
            Some(PolicyRule::Catalog(rule)) => {
                msg.put_message(3, Some(rule));
            }
            Some(PolicyRule::Lambda(rule)) => {
                msg.put_message(4, Some(rule));
            }
            None => {}
        }
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        let rule = match msg.which("rule").map(|f| f.number) {
            Some(3) => msg.message(3)?.map(PolicyRule::Catalog),
            Some(4) => msg.message(4)?.map(PolicyRule::Lambda),
            _ => None,
        };
        Ok(Self {
            namespace: msg.string(1),
            name: msg.string(2),
            rule,
            actions: msg.strings(5),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRule {
    pub catalog_name: String,
    pub read: bool,
    pub write: bool,
}

impl Message for CatalogRule {
    fn descriptor() -> &'static MessageDescriptor {
        &CATALOG_RULE
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&CATALOG_RULE);
        msg.put(1, Value::from(self.catalog_name.as_str()))
            .put(2, Value::Bool(self.read))
            .put(3, Value::Bool(self.write));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            catalog_name: msg.string(1),
            read: msg.bool(2),
            write: msg.bool(3),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LambdaRule {
    pub lambda_name: String,
    pub invoke: bool,
}

impl Message for LambdaRule {
    fn descriptor() -> &'static MessageDescriptor {
        &LAMBDA_RULE
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&LAMBDA_RULE);
        msg.put(1, Value::from(self.lambda_name.as_str()))
            .put(2, Value::Bool(self.invoke));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            lambda_name: msg.string(1),
            invoke: msg.bool(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetPolicyRequest {
    pub namespace: String,
    pub name: String,
}

impl Message for GetPolicyRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &GET_POLICY_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&GET_POLICY_REQUEST);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::from(self.name.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
            name: msg.string(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPoliciesRequest {
    pub namespace: String,
}

impl Message for ListPoliciesRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &LIST_POLICIES_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&LIST_POLICIES_REQUEST);
        msg.put(1, Value::from(self.namespace.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
        })
    }
}

/// Typed client for `auth.AuthenticationService`.
#[derive(Clone)]
pub struct AuthenticationServiceClient {
    inner: ServiceClient,
}

impl AuthenticationServiceClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticateResponse> {
        self.inner.unary(AUTHENTICATE, request).await
    }

    pub async fn refresh_token(&self, request: &RefreshTokenRequest) -> Result<RefreshTokenResponse> {
        self.inner.unary(REFRESH_TOKEN, request).await
    }
}

/// Typed client for `auth.PolicyService`.
#[derive(Clone)]
pub struct PolicyServiceClient {
    inner: ServiceClient,
}

impl PolicyServiceClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn get_policy(&self, request: &GetPolicyRequest) -> Result<Policy> {
        self.inner.unary(GET_POLICY, request).await
    }

    pub async fn list_policies(
        &self,
        request: &ListPoliciesRequest,
    ) -> Result<MessageStream<Policy>> {
        self.inner.server_streaming(LIST_POLICIES, request).await
    }
}
