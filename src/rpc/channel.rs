// src/rpc/channel.rs

//! Checked control channel.
//!
//! Wraps a [`RemotePrimitives`] handle and turns every status code into a
//! `Result` via [`crate::status::check`]. The execute-command and evaluate
//! failure codes are mapped onto `CommandFailed` / `EvalFailed` here, since
//! only those two calls return the engine's explanation alongside the code.

use tracing::trace;

use crate::decode::EvalResult;
use crate::errors::{Result, T32Error};
use crate::rpc::{
    AddressWidth, ConfigKey, DeviceKind, Message, MessageKinds, PracticeState,
    RESPONSE_CAPACITY, RemotePrimitives,
};
use crate::status::{StatusCode, check, codes};

/// Parameters needed to (re)open a channel to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub node: String,
    pub port: u16,
    pub packlen: Option<u32>,
    /// Remote API timeout in seconds.
    pub timeout: Option<u32>,
    pub hostport: Option<u16>,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            node: "localhost".to_string(),
            port: 20000,
            packlen: None,
            timeout: None,
            hostport: None,
        }
    }
}

pub struct ControlChannel<A: RemotePrimitives> {
    api: A,
    open: bool,
}

impl<A: RemotePrimitives> ControlChannel<A> {
    pub fn new(api: A) -> Self {
        Self { api, open: false }
    }

    /// True between a successful `init` and the next `exit`.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn configure(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let code = self.api.config(key, value).await;
        check("T32_Config", &[&key.as_str(), &value], code)
    }

    /// Push every configured link parameter to the primitive layer.
    pub async fn configure_link(&mut self, link: &LinkParams) -> Result<()> {
        self.configure(ConfigKey::Node, &link.node).await?;
        self.configure(ConfigKey::Port, &link.port.to_string()).await?;
        if let Some(packlen) = link.packlen {
            self.configure(ConfigKey::PackLen, &packlen.to_string()).await?;
        }
        if let Some(timeout) = link.timeout {
            self.configure(ConfigKey::Timeout, &timeout.to_string()).await?;
        }
        if let Some(hostport) = link.hostport {
            self.configure(ConfigKey::HostPort, &hostport.to_string()).await?;
        }
        Ok(())
    }

    pub async fn init(&mut self) -> Result<()> {
        let code = self.api.init().await;
        check("T32_Init", &[], code)?;
        self.open = true;
        Ok(())
    }

    pub async fn attach(&mut self, device: DeviceKind) -> Result<()> {
        let code = self.api.attach(device).await;
        check("T32_Attach", &[&device.code()], code)
    }

    /// Close the channel. It counts as closed even if the call fails.
    pub async fn exit(&mut self) -> Result<()> {
        let code = self.api.exit().await;
        self.open = false;
        check("T32_Exit", &[], code)
    }

    pub async fn ping(&mut self) -> Result<()> {
        let code = self.api.ping().await;
        check("T32_Ping", &[], code)
    }

    pub async fn nop(&mut self) -> Result<()> {
        let code = self.api.nop().await;
        check("T32_Nop", &[], code)
    }

    pub async fn cmd(&mut self, text: &str) -> Result<()> {
        trace!(cmd = text, "T32_Cmd");
        let code = self.api.cmd(text).await;
        check("T32_Cmd", &[&text], code)
    }

    pub async fn execute_command(&mut self, text: &str) -> Result<String> {
        trace!(cmd = text, "T32_ExecuteCommand");
        let (code, reply) = self.api.execute_command(text, RESPONSE_CAPACITY).await;
        if code == codes::T32_ERR_EXECUTECOMMAND_FAIL {
            return Err(T32Error::CommandFailed {
                command: text.to_string(),
                message: reply.trim().to_string(),
            });
        }
        check("T32_ExecuteCommand", &[&text], code)?;
        Ok(reply)
    }

    pub async fn execute_function(&mut self, expression: &str) -> Result<EvalResult> {
        let (code, text, tag) = self
            .api
            .execute_function(expression, RESPONSE_CAPACITY)
            .await;
        if code == codes::T32_ERR_EXECUTEFUNCTION_FAIL {
            return Err(T32Error::EvalFailed {
                expression: expression.to_string(),
                reason: text.trim().to_string(),
            });
        }
        check("T32_ExecuteFunction", &[&expression], code)?;
        Ok(EvalResult { text, tag })
    }

    /// Current message line. A message with no classification reads as empty.
    pub async fn message(&mut self) -> Result<Message> {
        let (code, text, kinds) = self.api.get_message_string().await;
        check("T32_GetMessageString", &[], code)?;
        let kinds = MessageKinds(kinds);
        if kinds == MessageKinds::IGNORE {
            return Ok(Message::default());
        }
        Ok(Message {
            text: text.trim_end_matches('\0').to_string(),
            kinds,
        })
    }

    pub async fn practice_state(&mut self) -> Result<PracticeState> {
        let (code, state) = self.api.get_practice_state().await;
        check("T32_GetPracticeState", &[], code)?;
        PracticeState::from_code(state).ok_or_else(|| T32Error::CallFailure {
            call: "T32_GetPracticeState.pstate".to_string(),
            status: StatusCode::Unknown(state),
        })
    }

    pub async fn terminate(&mut self, exit_code: i32) -> Result<()> {
        let code = self.api.terminate(exit_code).await;
        check("T32_Terminate", &[&exit_code], code)
    }

    pub async fn stop(&mut self) -> Result<()> {
        let code = self.api.stop().await;
        check("T32_Stop", &[], code)
    }

    pub async fn read_memory(
        &mut self,
        address: u64,
        width: AddressWidth,
        len: usize,
    ) -> Result<Vec<u8>> {
        let (code, data) = self.api.read_memory(address, width, len).await;
        let at = format!("{address:#x}");
        check("T32_ReadMemory", &[&at, &width.bits(), &len], code)?;
        if data.len() != len {
            return Err(T32Error::ProtocolError(format!(
                "memory read at {address:#x} returned {} of {len} bytes",
                data.len()
            )));
        }
        Ok(data)
    }

    pub async fn write_memory(
        &mut self,
        address: u64,
        width: AddressWidth,
        data: &[u8],
    ) -> Result<()> {
        let code = self.api.write_memory(address, width, data).await;
        let at = format!("{address:#x}");
        check("T32_WriteMemory", &[&at, &width.bits(), &data], code)
    }
}
