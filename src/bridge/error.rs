//! Bridge errors.

use thiserror::Error;

/// Error raised by a single bridge call.
///
/// These never reach the external caller. [`super::Bridge::invoke`] routes them
/// through the fallback chain and only returns one when no stage can answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The call exceeded its timeout on the final attempt.
    #[error("{component}.{method} timed out after {timeout_ms}ms")]
    Timeout {
        /// Remote component.
        component: String,
        /// Remote method.
        method: String,
        /// Per-attempt timeout.
        timeout_ms: u64,
    },

    /// The call failed in transport or the remote side reported failure.
    #[error("{component}.{method} failed: {cause}")]
    Execution {
        /// Remote component.
        component: String,
        /// Remote method.
        method: String,
        /// Underlying cause.
        cause: String,
    },

    /// The component's breaker is open; no remote call was attempted.
    #[error("circuit open for '{component}'")]
    CircuitOpen {
        /// Remote component.
        component: String,
    },

    /// The response did not match the envelope schema.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// No remote runtime is configured.
    #[error("no remote runtime for '{component}'")]
    Disconnected {
        /// Remote component.
        component: String,
    },

    /// No fallback stage could answer.
    #[error("no fallback for {component}.{method}: {cause}")]
    Unavailable {
        /// Remote component.
        component: String,
        /// Remote method.
        method: String,
        /// The error that triggered the fallback.
        cause: String,
    },
}

impl BridgeError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Execution { .. } => "error",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Malformed(_) => "malformed",
            Self::Disconnected { .. } => "disconnected",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    /// Whether this error counts against the breaker.
    #[must_use]
    pub const fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Execution { .. } | Self::Malformed(_)
        )
    }
}

impl From<BridgeError> for crate::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout {
                component,
                method,
                timeout_ms,
            } => Self::BridgeTimeout {
                component,
                method,
                timeout_ms,
            },
            BridgeError::Execution {
                component,
                method,
                cause,
            }
            | BridgeError::Unavailable {
                component,
                method,
                cause,
            } => Self::BridgeExecution {
                component,
                method,
                cause,
            },
            BridgeError::CircuitOpen { component } => Self::CircuitOpen { component },
            BridgeError::Malformed(message) => Self::MalformedEnvelope(message),
            BridgeError::Disconnected { component } => Self::BridgeExecution {
                component,
                method: String::new(),
                cause: "disconnected".to_string(),
            },
        }
    }
}
