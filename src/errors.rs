// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every failure surfaced by a session falls into one of these variants.
//! Status codes returned by the remote API are classified in
//! [`crate::status`]; the command/script/evaluation variants are raised by
//! the execution layer once it has inspected the engine's message line.

use std::time::Duration;

use thiserror::Error;

use crate::status::StatusCode;

#[derive(Error, Debug)]
pub enum T32Error {
    /// A primitive returned a known negative status code. Fatal to the session.
    #[error("communication error in {call}: {status}")]
    Communication { call: String, status: StatusCode },

    /// The engine could not be reached before the connect deadline.
    #[error("init/attach timeout: no engine at {node}:{port} within {timeout:?}")]
    ConnectTimeout {
        node: String,
        port: u16,
        timeout: Duration,
    },

    /// A primitive returned a positive or unknown status code.
    #[error("{call} failed with {status}")]
    CallFailure { call: String, status: StatusCode },

    #[error("command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("script failed: {message}\n{script}")]
    ScriptFailed { script: String, message: String },

    #[error("evaluation of '{expression}' failed: {reason}")]
    EvalFailed { expression: String, reason: String },

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// The engine answered, but not in the way the capture protocol expects.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("address range at {address:#x} overflows at offset {offset}")]
    AddressOverflow { address: u64, offset: u64 },

    #[error("session is not connected")]
    NotConnected,

    #[error("interrupted")]
    Interrupted,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl T32Error {
    /// True for failures of the link itself: negative status codes and
    /// connect timeouts.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            T32Error::Communication { .. } | T32Error::ConnectTimeout { .. }
        )
    }

    /// Re-classify a command failure raised while submitting a script so the
    /// caller sees the full script text.
    pub fn into_script_failure(self, script: &str) -> T32Error {
        match self {
            T32Error::CommandFailed { message, .. } => T32Error::ScriptFailed {
                script: script.to_string(),
                message,
            },
            other => other,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, T32Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_count_as_communication_errors() {
        let err = T32Error::ConnectTimeout {
            node: "localhost".into(),
            port: 20000,
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_communication());
        assert!(err.to_string().contains("init/attach timeout"));
        assert!(!T32Error::NotConnected.is_communication());
    }

    #[test]
    fn command_failure_becomes_script_failure() {
        let err = T32Error::CommandFailed {
            command: "DO /tmp/x.cmm".into(),
            message: "syntax error".into(),
        }
        .into_script_failure("PRINT 1\nENDDO");

        match err {
            T32Error::ScriptFailed { script, message } => {
                assert_eq!(script, "PRINT 1\nENDDO");
                assert_eq!(message, "syntax error");
            }
            other => panic!("expected ScriptFailed, got {other:?}"),
        }
    }
}
