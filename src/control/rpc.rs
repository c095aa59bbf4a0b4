//! JSON-RPC 2.0 envelopes for the control channel

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use crate::playback::ControlError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// An incoming call
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// `None` when the field is absent, which makes the call a notification
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcRequest {
    /// Parse one text frame into a request, or the error response to send back
    pub fn parse(text: &str) -> Result<Self, RpcResponse> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RpcResponse::failure(Value::Null, RpcError::parse_error(e.to_string())))?;

        let id = match &value {
            Value::Object(fields) => fields.get("id").cloned().unwrap_or(Value::Null),
            _ => {
                return Err(RpcResponse::failure(
                    Value::Null,
                    RpcError::invalid_request("request must be a JSON object"),
                ))
            }
        };

        let request: RpcRequest = serde_json::from_value(value)
            .map_err(|e| RpcResponse::failure(id.clone(), RpcError::invalid_request(e.to_string())))?;

        if request.jsonrpc != JSONRPC_VERSION {
            return Err(RpcResponse::failure(
                id,
                RpcError::invalid_request(format!("unsupported jsonrpc version {:?}", request.jsonrpc)),
            ));
        }

        Ok(request)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {}", detail.into()))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid Request: {}", detail.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {}", detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {}", detail.into()))
    }
}

impl From<ControlError> for RpcError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::InvalidSpeed(_) | ControlError::InvalidDelay(_) => {
                Self::invalid_params(e.to_string())
            }
            ControlError::Unavailable => Self::internal(e.to_string()),
        }
    }
}

/// Response envelope; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
