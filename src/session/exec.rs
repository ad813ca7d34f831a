// src/session/exec.rs

//! Command execution, evaluation and memory access.
//!
//! Every operation starts from a cleared output window whose state has been
//! confirmed through the message line. Output is then framed by printing a
//! fresh random sentinel into the window after the command and reading the
//! pipe up to that sentinel.

use tracing::{debug, info};

use crate::decode::{EvalResult, Value, decode};
use crate::errors::{Result, T32Error};
use crate::output::{PipeSource, random_label};
use crate::rpc::{AddressWidth, Connector};
use crate::session::{FLAG_LEN, OutputWindow, Session};

impl<C: Connector, P: PipeSource> Session<C, P> {
    /// Run `text` and return everything it printed.
    pub async fn run_command(&mut self, text: &str) -> Result<String> {
        self.ensure_connected()?;
        let clear_flag = self.clear_window().await?;
        self.output.drain_pending()?;

        self.channel()?.execute_command(text).await?;
        let captured = self.capture_after(text).await?;

        let message = self.channel()?.message().await?;
        if message.text != clear_flag {
            let trailing = message.text.trim();
            if message.is_error() {
                return Err(T32Error::CommandFailed {
                    command: text.to_string(),
                    message: trailing.to_string(),
                });
            }
            if !trailing.is_empty() {
                info!(cmd = text, message = trailing, "engine message");
                self.transcript.record_line(trailing);
            }
        }

        Ok(String::from_utf8_lossy(&captured).into_owned())
    }

    /// Evaluate `expression` and decode the result by its type tag.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let raw = self.evaluate_raw(expression).await?;
        decode(&raw)
    }

    /// Evaluate `expression` and return the engine's text and type tag.
    pub async fn evaluate_raw(&mut self, expression: &str) -> Result<EvalResult> {
        self.ensure_connected()?;
        let clear_flag = self.clear_window().await?;

        let result = self.channel()?.execute_function(expression).await?;

        let message = self.channel()?.message().await?;
        if message.text != clear_flag && message.is_error() {
            return Err(T32Error::EvalFailed {
                expression: expression.to_string(),
                reason: message.text.trim().to_string(),
            });
        }
        debug!(expression, result = %result.text, tag = result.tag, "evaluated");
        Ok(result)
    }

    /// Evaluate `statement` if it is an expression, otherwise run it as a
    /// command and return its output.
    pub async fn execute_statement(&mut self, statement: &str) -> Result<String> {
        match self.evaluate(statement).await {
            Ok(value) => Ok(value.to_string()),
            Err(T32Error::EvalFailed { reason, .. }) => {
                debug!(statement, reason, "not an expression; running as command");
                self.run_command(statement).await
            }
            Err(err) => Err(err),
        }
    }

    /// Read `len` bytes of target memory. Without an explicit width,
    /// addresses above 4 GiB use 64-bit addressing.
    pub async fn read_memory(
        &mut self,
        address: u64,
        len: usize,
        width: Option<AddressWidth>,
    ) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        let width = width.unwrap_or_else(|| AddressWidth::for_address(address));
        self.channel()?.read_memory(address, width, len).await
    }

    pub async fn write_memory(
        &mut self,
        address: u64,
        data: &[u8],
        width: Option<AddressWidth>,
    ) -> Result<()> {
        self.ensure_connected()?;
        let width = width.unwrap_or_else(|| AddressWidth::for_address(address));
        self.channel()?.write_memory(address, width, data).await
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.channel()?.ping().await
    }

    /// Clear the output window and confirm the engine executed the clear by
    /// reading a fresh marker back from the message line. Returns the marker.
    pub(crate) async fn clear_window(&mut self) -> Result<String> {
        for command in self.window.clear_commands() {
            self.channel()?.cmd(&command).await?;
        }
        self.output.drain_pending()?;

        let flag = format!("Semaphore {}", random_label(FLAG_LEN));
        let channel = self.channel()?;
        channel
            .cmd(&OutputWindow::message_print_command(&flag))
            .await?;
        let message = channel.message().await?;
        if message.text != flag {
            return Err(T32Error::ProtocolError(format!(
                "output window not cleared: expected message '{flag}', engine reported '{}'",
                message.text
            )));
        }
        Ok(flag)
    }

    /// Print a fresh sentinel into the window and capture everything before
    /// it. Residual output is drained afterwards.
    pub(crate) async fn capture_after(&mut self, what: &str) -> Result<Vec<u8>> {
        let flag = random_label(FLAG_LEN);
        let print = self.window.print_command(&flag);
        self.channel()?.cmd(&print).await?;

        let poll = self.config.timing.capture_poll;
        let mut reader = self.output.read_until(flag.as_bytes(), poll);
        let mut captured = Vec::new();
        while let Some(chunk) = reader.next_chunk().await? {
            self.transcript.record(&chunk);
            captured.extend_from_slice(&chunk);
        }

        let residue = self.output.drain_pending()?;
        debug!(op = what, bytes = captured.len(), residue, "output captured");
        Ok(captured)
    }
}
