use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of envelope used in the JSON protocol.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Response,
    Event,
}

/// Standard RPC style error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    /// Structured detail, e.g. the conflicting entity of a 409.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Top level envelope exchanged between core and plugins.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<String>,
    pub kind: Kind,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub topic: Option<String>,
    pub payload: Option<Value>,
}

impl Envelope {
    fn empty(kind: Kind) -> Self {
        Self {
            id: None,
            kind,
            method: None,
            params: None,
            result: None,
            error: None,
            topic: None,
            payload: None,
        }
    }

    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            ..Self::empty(Kind::Request)
        }
    }

    /// Successful reply to the request carrying `id`.
    pub fn response(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            ..Self::empty(Kind::Response)
        }
    }

    pub fn error_response(id: Option<String>, error: RpcError) -> Self {
        Self {
            id,
            error: Some(error),
            ..Self::empty(Kind::Response)
        }
    }

    /// Fire-and-forget notification published under `topic`.
    pub fn event(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: Some(topic.into()),
            payload: Some(payload),
            ..Self::empty(Kind::Event)
        }
    }

    pub fn is_request(&self, method: &str) -> bool {
        self.kind == Kind::Request && self.method.as_deref() == Some(method)
    }
}

/// Metadata a plugin provides during the init phase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub needs: Vec<String>,
}
