// src/session/window.rs

//! Engine-side output window ("AREA") commands.

use std::path::Path;

use crate::output::random_label;

/// Area the engine's message line is printed to.
pub const MESSAGE_AREA: &str = "A000";

const WINDOW_NAME_LEN: usize = 8;

/// The session's private output window. Its content is mirrored into the
/// session pipe once [`OutputWindow::create_commands`] have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputWindow {
    name: String,
}

impl OutputWindow {
    pub fn generate() -> Self {
        Self::named(random_label(WINDOW_NAME_LEN))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the window, mirror it into `pipe` and make it the active sink.
    pub fn create_commands(&self, pipe: &Path) -> [String; 3] {
        [
            format!("AREA.Create {} 4095. 1024.", self.name),
            format!(
                "AREA.OPEN {} {} /Append /NoFileCache",
                self.name,
                pipe.display()
            ),
            format!("AREA.Select {}", self.name),
        ]
    }

    pub fn clear_commands(&self) -> [String; 2] {
        [
            format!("AREA.CLEAR {}", self.name),
            format!("AREA.Select {}", self.name),
        ]
    }

    pub fn teardown_commands(&self) -> [String; 2] {
        [
            format!("AREA.CLOSE {}", self.name),
            format!("AREA.Delete {}", self.name),
        ]
    }

    /// Print `text` into this window (and so into the pipe).
    pub fn print_command(&self, text: &str) -> String {
        format!("PRINT %AREA {} \"{}\"", self.name, text)
    }

    /// Print `text` to the message line, where the message primitive can
    /// read it back.
    pub fn message_print_command(text: &str) -> String {
        format!("PRINT %AREA {MESSAGE_AREA} \"{text}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_eight_letters() {
        let window = OutputWindow::generate();
        assert_eq!(window.name().len(), 8);
        assert!(window.name().bytes().all(|b| b.is_ascii_uppercase()));
    }

    #[test]
    fn command_text() {
        let window = OutputWindow::named("QWERTZUI");
        let create = window.create_commands(Path::new("/tmp/t32/area.fifo"));
        assert_eq!(create[0], "AREA.Create QWERTZUI 4095. 1024.");
        assert_eq!(
            create[1],
            "AREA.OPEN QWERTZUI /tmp/t32/area.fifo /Append /NoFileCache"
        );
        assert_eq!(create[2], "AREA.Select QWERTZUI");
        assert_eq!(window.print_command("FLAG"), "PRINT %AREA QWERTZUI \"FLAG\"");
        assert_eq!(
            OutputWindow::message_print_command("Semaphore X"),
            "PRINT %AREA A000 \"Semaphore X\""
        );
    }
}
