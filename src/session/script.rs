// src/session/script.rs

//! Script execution.
//!
//! The engine only runs a script to completion once the submitting client
//! has let go of the control channel. Execution therefore goes:
//!
//! 1. validate the text, clear the window, submit `DO <file> [args]`;
//! 2. close the channel and start an idle watcher on a channel of its own,
//!    draining the pipe until the watcher exits;
//! 3. kill the watcher and reopen the channel, whatever happened in (2);
//! 4. report a drain failure, or capture the remaining output up to a
//!    fresh sentinel and check the message line.

use std::path::Path;

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, T32Error};
use crate::output::PipeSource;
use crate::rpc::Connector;
use crate::session::Session;
use crate::session::worker::{Worker, spawn_idle_watcher};

const TERMINATOR: &str = "ENDDO";

/// Check that a script ends with its terminator statement.
///
/// Comment lines (`;`) and blank lines are ignored.
pub fn validate_script(text: &str) -> Result<()> {
    let comment = Regex::new(r"^[ \t]*;").map_err(|e| T32Error::Other(e.into()))?;
    let last = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !comment.is_match(line))
        .last();

    match last {
        Some(line) if line.trim_start().to_ascii_uppercase().starts_with(TERMINATOR) => Ok(()),
        Some(line) => Err(T32Error::InvalidScript(format!(
            "script must end with {TERMINATOR}, last statement is '{}'",
            line.trim()
        ))),
        None => Err(T32Error::InvalidScript(format!(
            "script is empty; expected at least {TERMINATOR}"
        ))),
    }
}

impl<C: Connector, P: PipeSource> Session<C, P> {
    /// Run script `text`, passing `args` as its parameters.
    pub async fn run_script(&mut self, text: &str, args: &[String]) -> Result<String> {
        validate_script(text)?;
        self.ensure_connected()?;
        let file = self.workdir.write_script(text)?;
        let result = self.execute_script(file.path(), args, text).await;
        drop(file);
        result
    }

    /// Run the script stored at `path`.
    pub async fn run_script_file(&mut self, path: &Path, args: &[String]) -> Result<String> {
        let text = std::fs::read_to_string(path)?;
        validate_script(&text)?;
        self.ensure_connected()?;
        let path = std::path::absolute(path)?;
        self.execute_script(&path, args, &text).await
    }

    async fn execute_script(&mut self, path: &Path, args: &[String], script: &str) -> Result<String> {
        let mut interrupts = self.interrupt.subscribe();
        let clear_flag = self.clear_window().await?;
        let command = do_command(path, args);
        info!(script = %path.display(), "running script");
        self.channel()?
            .execute_command(&command)
            .await
            .map_err(|e| e.into_script_failure(script))?;

        self.release().await?;
        let mut watcher = spawn_idle_watcher(
            self.connector.clone(),
            self.config.link.clone(),
            self.config.timing.watch_poll,
        );

        let mut output = Vec::new();
        let drained = self
            .drain_while_running(&mut watcher, &mut interrupts, &mut output)
            .await;

        watcher.kill();
        self.reacquire().await?;

        if let Err(err) = drained {
            if matches!(err, T32Error::Interrupted) {
                warn!(script = %path.display(), "script interrupted; stopping interpreter");
                if let Err(stop_err) = self.channel()?.stop().await {
                    error!(error = %stop_err, "failed to stop interpreter");
                }
            }
            return Err(err);
        }

        let tail = self.capture_after("script").await?;
        output.extend_from_slice(&tail);

        let message = self.channel()?.message().await?;
        if message.text != clear_flag {
            if message.is_error() {
                return Err(T32Error::ScriptFailed {
                    script: script.to_string(),
                    message: message.text.trim().to_string(),
                });
            }
            output.push(b'\n');
            output.extend_from_slice(message.text.as_bytes());
        }

        debug!(bytes = output.len(), "script finished");
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn drain_while_running(
        &mut self,
        watcher: &mut Worker,
        interrupts: &mut watch::Receiver<u64>,
        output: &mut Vec<u8>,
    ) -> Result<()> {
        let poll = self.config.timing.drain_poll;
        loop {
            let chunk = self.output.read_available()?;
            self.transcript.record(&chunk);
            output.extend_from_slice(&chunk);

            if !watcher.is_alive() {
                return Ok(());
            }
            tokio::select! {
                changed = interrupts.changed() => {
                    if changed.is_ok() {
                        return Err(T32Error::Interrupted);
                    }
                    // Sender gone; nobody can interrupt any more.
                    tokio::time::sleep(poll).await;
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

fn do_command(path: &Path, args: &[String]) -> String {
    let mut command = format!("DO {}", path.display());
    for arg in args {
        command.push(' ');
        if arg.contains(char::is_whitespace) {
            command.push('"');
            command.push_str(arg);
            command.push('"');
        } else {
            command.push_str(arg);
        }
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_terminated_scripts() {
        assert!(validate_script("PRINT \"x\"\nENDDO").is_ok());
        assert!(validate_script("PRINT 1\n  enddo 0\n\n; trailing comment\n   \n").is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let err = validate_script("PRINT 1\nPRINT 2\n").unwrap_err();
        assert!(matches!(err, T32Error::InvalidScript(msg) if msg.contains("PRINT 2")));
    }

    #[test]
    fn comment_only_script_is_empty() {
        let err = validate_script("; ENDDO\n\t; nothing\n").unwrap_err();
        assert!(matches!(err, T32Error::InvalidScript(msg) if msg.contains("empty")));
    }

    #[test]
    fn do_command_quotes_arguments_with_spaces() {
        let cmd = do_command(
            Path::new("/tmp/run.cmm"),
            &["1".to_string(), "two words".to_string()],
        );
        assert_eq!(cmd, "DO /tmp/run.cmm 1 \"two words\"");
    }
}
