//! Clipboard access for copy actions.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};

/// Destination of copy actions.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Clipboard commands tried in order.
const CANDIDATES: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
    ("clip.exe", &[]),
];

/// System clipboard reached through an external command.
#[derive(Debug, Clone)]
pub struct SystemClipboard {
    program: PathBuf,
    args: &'static [&'static str],
}

impl SystemClipboard {
    /// Find the first available clipboard command on PATH.
    pub fn detect() -> Result<Self> {
        for &(name, args) in CANDIDATES {
            if let Ok(program) = which::which(name) {
                debug!("Found clipboard command at: {:?}", program);
                return Ok(Self { program, args });
            }
        }
        Err(Error::ClipboardFailure("no clipboard command found".into()))
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ClipboardFailure(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| Error::ClipboardFailure(e.to_string()))?;
        }

        let status = child
            .wait()
            .map_err(|e| Error::ClipboardFailure(e.to_string()))?;
        if !status.success() {
            return Err(Error::ClipboardFailure(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        Ok(())
    }
}

/// In-process clipboard, used when no system command is available.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|c| c.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let mut contents = self.contents.lock().map_err(|_| Error::LockPoisoned)?;
        *contents = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clipboard_keeps_last_write() {
        let clipboard = MemoryClipboard::default();
        assert_eq!(clipboard.contents(), None);
        clipboard.write_text("one").unwrap();
        clipboard.write_text("two").unwrap();
        assert_eq!(clipboard.contents().as_deref(), Some("two"));
    }
}
