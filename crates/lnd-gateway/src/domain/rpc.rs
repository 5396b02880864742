//! RPC request/response model.
//!
//! Pure (de)serialization contract. Requests encode as
//! `{"method": .., "params": {..}, "path": ..}`; responses follow the
//! Bitcoin Core shape `{"result": .., "error": {"code", "message"}}`.

use crate::domain::error::{GatewayError, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An outbound call: method, named parameters and the target path on the node.
///
/// Identity is structural. The same request may be dispatched more than
/// once; each dispatch gets its own correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub path: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
            path: path.into(),
        }
    }

    /// Add a named parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replace all parameters.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Reject requests that cannot be routed.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.method.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("method is empty".into()));
        }
        if self.path.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("target path is empty".into()));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a request from whatever form the caller handed over.
    pub fn inflate(value: RequestValue) -> Result<Self, GatewayError> {
        match value {
            RequestValue::Typed(request) => Ok(request),
            RequestValue::Map(map) => {
                serde_json::from_value(Value::Object(map)).map_err(|e| {
                    GatewayError::InvalidRequest(format!(
                        "unable to inflate RPC request from map: {e}"
                    ))
                })
            }
            RequestValue::Json(json) => Self::from_json(&json).map_err(|e| {
                GatewayError::InvalidRequest(format!(
                    "unable to inflate RPC request from string: {e}"
                ))
            }),
            RequestValue::Unsupported(other) => Err(GatewayError::InvalidRequest(format!(
                "must provide an RPC request, a map of one, or its JSON; got {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl fmt::Display for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// The forms in which a caller may supply a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestValue {
    Typed(RpcRequest),
    Map(Map<String, Value>),
    Json(String),
    Unsupported(Value),
}

impl From<RpcRequest> for RequestValue {
    fn from(request: RpcRequest) -> Self {
        RequestValue::Typed(request)
    }
}

impl From<Value> for RequestValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RequestValue::Map(map),
            Value::String(json) => RequestValue::Json(json),
            other => RequestValue::Unsupported(other),
        }
    }
}

impl From<String> for RequestValue {
    fn from(json: String) -> Self {
        RequestValue::Json(json)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Structured error reported by the remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Reply to an [`RpcRequest`]. At most one of `result`/`error` is populated;
/// a `null` result is represented as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcErrorObject>,
}

/// Wire shape before the exclusivity check.
#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(result: Value) -> Self {
        Self {
            result: (!result.is_null()).then_some(result),
            error: None,
        }
    }

    pub fn failure(error: RpcErrorObject) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Decode raw reply bytes.
    ///
    /// `error: null` or an omitted `error` means success. A payload carrying
    /// both a non-null `result` and a non-null `error` is malformed.
    pub fn decode(raw: &[u8]) -> Result<Self, ResponseError> {
        let value: Value = serde_json::from_slice(raw)?;
        if !value.is_object() {
            return Err(ResponseError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        }
        let raw: RawResponse = serde_json::from_value(value)?;
        if raw.result.is_some() && raw.error.is_some() {
            return Err(ResponseError::Malformed(
                "both result and error are populated".into(),
            ));
        }
        Ok(Self {
            result: raw.result,
            error: raw.error,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Split into the caller-visible outcome.
    pub fn into_result(self) -> Result<Value, RpcErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
