//! Versioned request/response envelope.
//!
//! One JSON object per message. Unknown fields are rejected.
//!
//! ```text
//! request:  {"version":1,"request_id":"...","component":"embedding","method":"embed","args":["text"]}
//! response: {"version":1,"request_id":"...","success":true,"result":{...},"timestamp":1700000000,
//!            "component":"embedding","method":"embed"}
//! ```

use super::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope schema version.
pub const PROTOCOL_VERSION: u32 = 1;

/// A request to a remote component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeRequest {
    /// Schema version.
    pub version: u32,
    /// Correlates the response with this request.
    pub request_id: String,
    /// Remote component name.
    pub component: String,
    /// Method on the component.
    pub method: String,
    /// Ordered positional arguments.
    pub args: Vec<Value>,
}

impl BridgeRequest {
    /// Creates a request with a fresh id.
    #[must_use]
    pub fn new(component: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id: uuid::Uuid::new_v4().to_string(),
            component: component.into(),
            method: method.into(),
            args,
        }
    }

    /// Returns a positional argument as a string.
    #[must_use]
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }

    /// Serializes the request as one line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Malformed`] if an argument cannot be serialized.
    pub fn to_line(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|e| BridgeError::Malformed(e.to_string()))
    }
}

/// A response from a remote component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeResponse {
    /// Schema version.
    pub version: u32,
    /// Id of the request this answers.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Whether the remote call succeeded.
    pub success: bool,
    /// Result on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Unix seconds when the remote produced the response.
    pub timestamp: u64,
    /// Echoed component.
    pub component: String,
    /// Echoed method.
    pub method: String,
}

impl BridgeResponse {
    /// Builds a successful response for a request.
    #[must_use]
    pub fn success(request: &BridgeRequest, result: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id: Some(request.request_id.clone()),
            success: true,
            result: Some(result),
            error: None,
            timestamp: crate::current_timestamp(),
            component: request.component.clone(),
            method: request.method.clone(),
        }
    }

    /// Builds a failed response for a request.
    #[must_use]
    pub fn failure(request: &BridgeRequest, error: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id: Some(request.request_id.clone()),
            success: false,
            result: None,
            error: Some(error.into()),
            timestamp: crate::current_timestamp(),
            component: request.component.clone(),
            method: request.method.clone(),
        }
    }

    /// Parses and validates a raw response line against its request.
    ///
    /// Returns the result value of a successful response.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Malformed`] for schema violations or mismatched
    /// component/method/id; [`BridgeError::Execution`] when the remote side
    /// reported `success: false`.
    pub fn parse(raw: &str, request: &BridgeRequest) -> Result<Value, BridgeError> {
        let response: Self = serde_json::from_str(raw.trim())
            .map_err(|e| BridgeError::Malformed(e.to_string()))?;
        response.into_result(request)
    }

    fn into_result(self, request: &BridgeRequest) -> Result<Value, BridgeError> {
        if self.version != PROTOCOL_VERSION {
            return Err(BridgeError::Malformed(format!(
                "unsupported version {} (expected {PROTOCOL_VERSION})",
                self.version
            )));
        }
        if self.component != request.component || self.method != request.method {
            return Err(BridgeError::Malformed(format!(
                "response for {}.{} does not match request {}.{}",
                self.component, self.method, request.component, request.method
            )));
        }
        if let Some(id) = &self.request_id {
            if id != &request.request_id {
                return Err(BridgeError::Malformed(format!(
                    "response id {id} does not match request id {}",
                    request.request_id
                )));
            }
        }
        if !self.success {
            return Err(BridgeError::Execution {
                component: self.component,
                method: self.method,
                cause: self
                    .error
                    .unwrap_or_else(|| "remote reported failure without error".to_string()),
            });
        }
        self.result
            .ok_or_else(|| BridgeError::Malformed("success response without result".to_string()))
    }
}
