// src/rpc/mod.rs

//! Remote API primitives.
//!
//! [`RemotePrimitives`] is the raw, one-call-per-primitive surface of the
//! engine's remote API. Every method returns the bare status code; checking
//! and classification happen one level up in [`channel::ControlChannel`].
//!
//! A [`Connector`] opens fresh, independent primitive handles. The session
//! keeps one for itself and hands clones of the connector to its workers so
//! each worker talks to the engine over its own channel.

pub mod bridge;
pub mod channel;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub use channel::{ControlChannel, LinkParams};

/// Boxed future returned by primitive calls.
pub type CallFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capacity of response buffers for execute-command and evaluate.
pub const RESPONSE_CAPACITY: usize = u16::MAX as usize;

/// Keys accepted by the configure primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Node,
    Port,
    PackLen,
    Timeout,
    HostPort,
}

impl ConfigKey {
    /// Keyword as the remote API expects it, including the `=`.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Node => "NODE=",
            ConfigKey::Port => "PORT=",
            ConfigKey::PackLen => "PACKLEN=",
            ConfigKey::Timeout => "TIMEOUT=",
            ConfigKey::HostPort => "HOSTPORT=",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device an attach call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Os,
    Icd,
}

impl DeviceKind {
    pub fn code(self) -> i32 {
        match self {
            DeviceKind::Os => 0,
            DeviceKind::Icd => 1,
        }
    }
}

/// Address width for memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    Bits32,
    Bits64,
}

impl AddressWidth {
    /// Narrowest width that can express `address`.
    pub fn for_address(address: u64) -> Self {
        if address > u64::from(u32::MAX) {
            AddressWidth::Bits64
        } else {
            AddressWidth::Bits32
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            AddressWidth::Bits32 => 32,
            AddressWidth::Bits64 => 64,
        }
    }
}

/// State of the engine's script interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeState {
    Idle,
    Running,
    Dialog,
}

impl PracticeState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PracticeState::Idle),
            1 => Some(PracticeState::Running),
            2 => Some(PracticeState::Dialog),
            _ => None,
        }
    }
}

/// Classification bitmask attached to the engine's message line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageKinds(pub u16);

impl MessageKinds {
    pub const IGNORE: MessageKinds = MessageKinds(0);
    pub const GENERAL_INFO: MessageKinds = MessageKinds(1);
    pub const ERROR: MessageKinds = MessageKinds(2);
    pub const STATUS_INFO: MessageKinds = MessageKinds(8);
    pub const ERROR_INFO: MessageKinds = MessageKinds(16);
    pub const TEMP_DISPLAY: MessageKinds = MessageKinds(32);
    pub const TEMP_INFO: MessageKinds = MessageKinds(64);

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, other: MessageKinds) -> bool {
        self.0 & other.0 == other.0
    }

    /// Error or error-info classification.
    pub fn is_error(self) -> bool {
        self.0 & (Self::ERROR.0 | Self::ERROR_INFO.0) != 0
    }
}

/// The engine's message line as returned by the message primitive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub text: String,
    pub kinds: MessageKinds,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.kinds.is_error()
    }
}

/// The engine's remote API, one method per primitive.
///
/// Implementations must not interpret status codes; they return what the
/// engine (or the transport) reported.
pub trait RemotePrimitives: Send + 'static {
    fn config<'a>(&'a mut self, key: ConfigKey, value: &'a str) -> CallFuture<'a, i32>;

    fn init(&mut self) -> CallFuture<'_, i32>;

    fn attach(&mut self, device: DeviceKind) -> CallFuture<'_, i32>;

    fn exit(&mut self) -> CallFuture<'_, i32>;

    fn ping(&mut self) -> CallFuture<'_, i32>;

    fn nop(&mut self) -> CallFuture<'_, i32>;

    /// Run a command synchronously, without capturing its output.
    fn cmd<'a>(&'a mut self, text: &'a str) -> CallFuture<'a, i32>;

    fn execute_command<'a>(
        &'a mut self,
        text: &'a str,
        capacity: usize,
    ) -> CallFuture<'a, (i32, String)>;

    /// Evaluate an expression; returns status, result text and type tag.
    fn execute_function<'a>(
        &'a mut self,
        expression: &'a str,
        capacity: usize,
    ) -> CallFuture<'a, (i32, String, u32)>;

    fn get_message_string(&mut self) -> CallFuture<'_, (i32, String, u16)>;

    fn get_practice_state(&mut self) -> CallFuture<'_, (i32, i32)>;

    fn terminate(&mut self, exit_code: i32) -> CallFuture<'_, i32>;

    fn stop(&mut self) -> CallFuture<'_, i32>;

    fn read_memory(
        &mut self,
        address: u64,
        width: AddressWidth,
        len: usize,
    ) -> CallFuture<'_, (i32, Vec<u8>)>;

    fn write_memory<'a>(
        &'a mut self,
        address: u64,
        width: AddressWidth,
        data: &'a [u8],
    ) -> CallFuture<'a, i32>;
}

/// Opens independent primitive handles against one engine.
pub trait Connector: Clone + Send + Sync + 'static {
    type Api: RemotePrimitives;

    fn open(&self) -> Self::Api;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kinds_error_classification() {
        assert!(MessageKinds::ERROR.is_error());
        assert!(MessageKinds::ERROR_INFO.is_error());
        assert!(MessageKinds(MessageKinds::ERROR.0 | MessageKinds::STATUS_INFO.0).is_error());
        assert!(!MessageKinds::GENERAL_INFO.is_error());
        assert!(!MessageKinds::IGNORE.is_error());
        assert!(MessageKinds(9).contains(MessageKinds::STATUS_INFO));
    }

    #[test]
    fn address_width_follows_address() {
        assert_eq!(AddressWidth::for_address(0xFFFF_FFFF), AddressWidth::Bits32);
        assert_eq!(AddressWidth::for_address(0x1_0000_0000), AddressWidth::Bits64);
    }

    #[test]
    fn practice_state_codes() {
        assert_eq!(PracticeState::from_code(0), Some(PracticeState::Idle));
        assert_eq!(PracticeState::from_code(2), Some(PracticeState::Dialog));
        assert_eq!(PracticeState::from_code(-1), None);
    }
}
