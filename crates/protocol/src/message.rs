//! Message types carried over the gateway session.
//!
//! [`MessageRequest`] is the outbound unit (device -> gateway) and
//! [`Directive`] the inbound unit (gateway -> device). [`Status`] reports
//! how a send attempt completed, gRPC-style: a coarse [`StatusCode`] plus an
//! optional human-readable description.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound event sent from the device to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// Capability namespace (e.g. "ASR", "System").
    pub namespace: String,
    /// Event name within the namespace.
    pub name: String,
    /// JSON payload.
    pub payload: Value,
    /// Optional per-message headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl MessageRequest {
    /// Creates a request with an empty header map.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            payload,
            headers: HashMap::new(),
        }
    }
}

/// Inbound server-initiated message delivered on the directives channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    /// Capability namespace.
    pub namespace: String,
    /// Directive name within the namespace.
    pub name: String,
    /// Dialog request this directive belongs to, when correlated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_request_id: Option<String>,
    /// JSON payload.
    pub payload: Value,
}

/// Coarse completion code for a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Cancelled,
    DeadlineExceeded,
    FailedPrecondition,
    Unauthenticated,
    Unavailable,
    Internal,
}

/// Completion status of a send attempt: code plus optional description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Completion code.
    pub code: StatusCode,
    /// Human-readable context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Status {
    /// Successful completion.
    pub const OK: Status = Status::new(StatusCode::Ok);
    /// The attempt was abandoned before completing.
    pub const CANCELLED: Status = Status::new(StatusCode::Cancelled);
    /// The attempt ran out of time.
    pub const DEADLINE_EXCEEDED: Status = Status::new(StatusCode::DeadlineExceeded);
    /// The connection was not in a state that could carry the message.
    pub const FAILED_PRECONDITION: Status = Status::new(StatusCode::FailedPrecondition);
    /// Credentials were missing or rejected.
    pub const UNAUTHENTICATED: Status = Status::new(StatusCode::Unauthenticated);
    /// The gateway was unreachable.
    pub const UNAVAILABLE: Status = Status::new(StatusCode::Unavailable);
    /// Something broke inside the session.
    pub const INTERNAL: Status = Status::new(StatusCode::Internal);

    /// Creates a status with no description.
    pub const fn new(code: StatusCode) -> Self {
        Self {
            code,
            description: None,
        }
    }

    /// Returns a copy of this status carrying `description`.
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            code: self.code,
            description: Some(description.into()),
        }
    }

    /// Returns true if the code is [`StatusCode::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}
