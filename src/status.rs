// src/status.rs

//! Status code classification for remote API calls.
//!
//! The code table is generated at build time (see `build.rs`). The sign of a
//! known code decides its class: `0` is success, negative codes are link
//! failures, positive codes are engine-side failures of the individual call.

use std::fmt;

use crate::errors::{Result, T32Error};

/// Generated constants and lookup table.
pub mod codes {
    include!(concat!(env!("OUT_DIR"), "/errcodes.rs"));
}

pub use codes::ERRCODE_TABLE_VERSION;

/// Longest argument representation kept in a [`T32Error::CallFailure`].
const MAX_ARG_REPR: usize = 64;

/// A status code as returned by a primitive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Known { name: &'static str, value: i32 },
    Unknown(i32),
}

impl StatusCode {
    pub fn classify(value: i32) -> Self {
        codes::ERRCODES
            .iter()
            .find(|(_, code)| *code == value)
            .map(|(name, value)| StatusCode::Known {
                name: *name,
                value: *value,
            })
            .unwrap_or(StatusCode::Unknown(value))
    }

    pub fn value(self) -> i32 {
        match self {
            StatusCode::Known { value, .. } | StatusCode::Unknown(value) => value,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        match self {
            StatusCode::Known { name, .. } => Some(name),
            StatusCode::Unknown(_) => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self.value() == 0
    }

    pub fn is_communication(self) -> bool {
        matches!(self, StatusCode::Known { value, .. } if value < 0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Known { name, value } => write!(f, "{name} ({value})"),
            StatusCode::Unknown(value) => write!(f, "unknown status {value}"),
        }
    }
}

/// Check the status code returned by `call` invoked with `args`.
pub fn check(call: &str, args: &[&dyn fmt::Debug], code: i32) -> Result<()> {
    let status = StatusCode::classify(code);
    if status.is_ok() {
        return Ok(());
    }
    if status.is_communication() {
        return Err(T32Error::Communication {
            call: call.to_string(),
            status,
        });
    }
    Err(T32Error::CallFailure {
        call: describe_call(call, args),
        status,
    })
}

fn describe_call(call: &str, args: &[&dyn fmt::Debug]) -> String {
    let args: Vec<String> = args.iter().map(|arg| truncated_repr(*arg)).collect();
    format!("{call}({})", args.join(", "))
}

fn truncated_repr(arg: &dyn fmt::Debug) -> String {
    let repr = format!("{arg:?}");
    if repr.chars().count() <= MAX_ARG_REPR {
        return repr;
    }
    let mut short: String = repr.chars().take(MAX_ARG_REPR).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_ok() {
        let status = StatusCode::classify(0);
        assert_eq!(status.name(), Some("OK"));
        assert!(check("T32_Ping", &[], 0).is_ok());
    }

    #[test]
    fn known_negative_code_is_communication_error() {
        let err = check("T32_Ping", &[], codes::T32_ERR_COM_RECEIVE_FAIL).unwrap_err();
        match err {
            T32Error::Communication { call, status } => {
                assert_eq!(call, "T32_Ping");
                assert_eq!(status.name(), Some("T32_ERR_COM_RECEIVE_FAIL"));
            }
            other => panic!("expected Communication, got {other:?}"),
        }
    }

    #[test]
    fn known_positive_code_is_call_failure() {
        let err = check("T32_Cmd", &[&"SYStem.Up"], codes::T32_ERR_STD_FAILED).unwrap_err();
        match err {
            T32Error::CallFailure { call, status } => {
                assert_eq!(call, "T32_Cmd(\"SYStem.Up\")");
                assert_eq!(status.value(), codes::T32_ERR_STD_FAILED);
            }
            other => panic!("expected CallFailure, got {other:?}"),
        }
    }

    #[test]
    fn unknown_codes_are_call_failures_even_when_negative() {
        let err = check("T32_Nop", &[], -4242).unwrap_err();
        assert!(matches!(
            err,
            T32Error::CallFailure {
                status: StatusCode::Unknown(-4242),
                ..
            }
        ));
    }

    #[test]
    fn long_arguments_are_truncated() {
        let long = "A".repeat(200);
        let err = check("T32_Cmd", &[&long, &7u32], 12345).unwrap_err();
        let T32Error::CallFailure { call, .. } = err else {
            panic!("expected CallFailure");
        };
        let expected = format!("T32_Cmd(\"{}..., 7)", "A".repeat(63));
        assert_eq!(call, expected);
    }

    #[test]
    fn table_has_a_version() {
        assert!(!ERRCODE_TABLE_VERSION.is_empty());
    }
}
