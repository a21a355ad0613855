//! Error types for fcrun.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using fcrun's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bootstrapping or controlling a microVM.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed validation before launch.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The hypervisor process could not be spawned.
    #[error("failed to launch hypervisor: {message}")]
    Launch {
        /// What went wrong, including the executable path.
        message: String,
    },

    /// The control socket was unreachable or the connection broke mid-call.
    #[error("transport error: {0}")]
    Transport(String),

    /// The hypervisor answered with something that does not parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Well-formed error response from the hypervisor control API.
    #[error("api error (status {code}): {message}")]
    Api {
        /// Machine-readable code; the HTTP status code as a string.
        code: String,
        /// Human-readable message from the fault body or status line.
        message: String,
    },

    /// The control API did not answer within the probe budget.
    #[error("control api not ready after {waited:?}; last error: {last}")]
    ReadinessTimeout {
        /// How long the probe actually waited.
        waited: Duration,
        /// The last failure observed before the deadline fired.
        last: String,
    },

    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-configuration error with a message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a launch error with a message.
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch {
            message: msg.into(),
        }
    }

    /// Create a transport error with a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages should carry the context needed to diagnose a failed
    /// launch without a debugger attached.

    #[test]
    fn test_launch_error_includes_message() {
        let err = Error::launch("/usr/bin/firecracker: No such file or directory");
        assert!(err.to_string().contains("/usr/bin/firecracker"));
    }

    #[test]
    fn test_api_error_includes_code_and_message() {
        let err = Error::Api {
            code: "400".to_string(),
            message: "The kernel image path is invalid".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"), "Error should include the status code");
        assert!(
            msg.contains("kernel image path"),
            "Error should include the fault message"
        );
    }

    #[test]
    fn test_readiness_timeout_includes_last_error() {
        let err = Error::ReadinessTimeout {
            waited: Duration::from_millis(250),
            last: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("connection refused"),
            "Timeout should surface the last probe failure"
        );
    }

    #[test]
    fn test_invalid_config_includes_reason() {
        let err = Error::invalid_config("duplicate drive id \"root\"");
        assert!(err.to_string().contains("duplicate drive id"));
    }
}
