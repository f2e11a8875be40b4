//! JSON-RPC 2.0 request/response frames
//!
//! Every frame is a single JSON object on its own line:
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"scheduler.ready","params":[]}
//! ← {"jsonrpc":"2.0","id":1,"result":null}
//!
//! → {"jsonrpc":"2.0","id":2,"method":"rti.loadNeutralComponents","params":[["A","B"]]}
//! ← {"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found: rti.load"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol version carried in every frame
pub const JSONRPC_VERSION: &str = "2.0";

/// Upper bound on a single frame, in bytes
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// JSON-RPC error object
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Error code
    pub code: i64,
    /// Human-readable description
    pub message: String,
    /// Optional structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Frame was not valid JSON
    pub const PARSE_ERROR: i64 = -32700;
    /// JSON was not a valid request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown service or method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Params did not match the method
    pub const INVALID_PARAMS: i64 = -32602;
    /// Handler failed
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Create an error with an arbitrary code
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Unparsable frame
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(Self::PARSE_ERROR, format!("Parse error: {}", detail))
    }

    /// Parsed but not a request
    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(Self::INVALID_REQUEST, format!("Invalid request: {}", detail))
    }

    /// No such method
    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Bad arguments
    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(Self::INVALID_PARAMS, format!("Invalid params: {}", detail))
    }

    /// Handler failure
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(Self::INTERNAL_ERROR, format!("Internal error: {}", detail))
    }
}

/// A call (with `id`) or notification (without)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Correlation id; absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Qualified method name, `<service>.<method>`
    pub method: String,
    /// Positional arguments
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Create a call expecting a response
    pub fn call(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: method.into(),
            params,
        }
    }

    /// Create a notification that will not be answered
    pub fn notification(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether the sender expects no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Split `<service>.<method>` at the last dot
    pub fn service_and_method(&self) -> Option<(&str, &str)> {
        self.method.rsplit_once('.')
    }

    /// Serialize to a single line (no trailing newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame, distinguishing bad JSON from a bad request shape
    pub fn from_line(line: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(line).map_err(RpcError::parse_error)?;
        let request: RpcRequest =
            serde_json::from_value(value).map_err(RpcError::invalid_request)?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(RpcError::invalid_request(format!(
                "unsupported jsonrpc version {:?}",
                request.jsonrpc
            )));
        }
        Ok(request)
    }
}

/// Answer to a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Id of the call being answered; null if it could not be read
    pub id: Value,
    /// Result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Serialize to a single line (no trailing newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Collapse into the call's outcome.
    ///
    /// A `"result": null` deserializes as `None`, so a missing result without
    /// an error is a successful void call.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Decode the positional string list at `index`.
///
/// `null` and a missing argument both yield `None`.
pub fn optional_string_list(params: &[Value], index: usize) -> Result<Option<Vec<String>>, RpcError> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| RpcError::invalid_params(format!("argument {}: {}", index, e))),
    }
}

/// Decode the positional string list at `index`, which must be present
pub fn string_list(params: &[Value], index: usize) -> Result<Vec<String>, RpcError> {
    optional_string_list(params, index)?
        .ok_or_else(|| RpcError::invalid_params(format!("argument {} is required", index)))
}

/// Decode the positional string at `index`, which must be present
pub fn string_arg(params: &[Value], index: usize) -> Result<String, RpcError> {
    match params.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(RpcError::invalid_params(format!(
            "argument {} must be a string, got {}",
            index, other
        ))),
        None => Err(RpcError::invalid_params(format!("argument {} is required", index))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = RpcRequest::call(7, "rti.loadNeutralComponents", vec![json!(["A", "B"])]);
        let line = request.to_line().unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","id":7,"method":"rti.loadNeutralComponents","params":[["A","B"]]}"#
        );
    }

    #[test]
    fn test_notification_omits_id() {
        let request = RpcRequest::notification("rti.start", vec![]);
        let line = request.to_line().unwrap();
        assert!(!line.contains("\"id\""));
        assert!(RpcRequest::from_line(&line).unwrap().is_notification());
    }

    #[test]
    fn test_request_without_params() {
        let request = RpcRequest::from_line(r#"{"jsonrpc":"2.0","id":1,"method":"rti.start"}"#).unwrap();
        assert!(request.params.is_empty());
        assert_eq!(request.service_and_method(), Some(("rti", "start")));
    }

    #[test]
    fn test_parse_error_vs_invalid_request() {
        assert_eq!(
            RpcRequest::from_line("{not json").unwrap_err().code,
            RpcError::PARSE_ERROR
        );
        assert_eq!(
            RpcRequest::from_line(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err().code,
            RpcError::INVALID_REQUEST
        );
        assert_eq!(
            RpcRequest::from_line(r#"{"jsonrpc":"1.0","id":1,"method":"a.b"}"#)
                .unwrap_err()
                .code,
            RpcError::INVALID_REQUEST
        );
    }

    #[test]
    fn test_void_success_serializes_null_result() {
        let line = RpcResponse::success(json!(3), Value::Null).to_line().unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":3,"result":null}"#);
        let parsed = RpcResponse::from_line(&line).unwrap();
        assert_eq!(parsed.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response_into_result() {
        let line = RpcResponse::failure(json!(4), RpcError::method_not_found("rti.nope"))
            .to_line()
            .unwrap();
        assert!(!line.contains("result"));
        let err = RpcResponse::from_line(&line).unwrap().into_result().unwrap_err();
        assert_eq!(err.code, RpcError::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_string_list_params() {
        let params = vec![json!("click"), json!(["A"]), Value::Null];
        assert_eq!(string_arg(&params, 0).unwrap(), "click");
        assert_eq!(string_list(&params, 1).unwrap(), vec!["A".to_string()]);
        assert_eq!(optional_string_list(&params, 2).unwrap(), None);
        assert_eq!(optional_string_list(&params, 9).unwrap(), None);
        assert!(string_list(&params, 2).is_err());
        assert!(string_list(&[json!([1, 2])], 0).is_err());
        assert!(string_arg(&[json!(5)], 0).is_err());
    }
}
