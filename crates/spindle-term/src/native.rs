//! Native capability provider
//!
//! Interactivity and ANSI support are detected once per process and memoized;
//! enabling ANSI on a Windows console mutates the console mode, so repeating
//! it on every query would be wasteful. The size is queried fresh each time
//! because terminals get resized.

use std::io::IsTerminal;
use std::sync::OnceLock;

use crossterm::{cursor, execute};
use tracing::debug;

use crate::{Capabilities, TerminalSize, TermError};

#[cfg(unix)]
use crate::unix as platform;
#[cfg(windows)]
use crate::windows as platform;

static INTERACTIVE: OnceLock<bool> = OnceLock::new();
static ANSI: OnceLock<bool> = OnceLock::new();

/// Capability provider backed by the process's real terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTerminal;

impl NativeTerminal {
    /// Create the provider. Detection is lazy.
    pub fn new() -> Self {
        Self
    }
}

impl Capabilities for NativeTerminal {
    fn is_interactive(&self) -> bool {
        *INTERACTIVE.get_or_init(|| std::io::stdout().is_terminal())
    }

    fn supports_ansi_escapes(&self) -> bool {
        *ANSI.get_or_init(|| {
            if !self.is_interactive() {
                return false;
            }
            match platform::enable_ansi() {
                Ok(()) => true,
                Err(err) => {
                    debug!(%err, "ANSI escapes disabled");
                    false
                }
            }
        })
    }

    fn terminal_size(&self) -> TerminalSize {
        query_size().unwrap_or_else(|err| {
            debug!(%err, "falling back to default terminal size");
            TerminalSize::DEFAULT
        })
    }

    fn set_cursor_visible(&self, visible: bool) {
        if !self.is_interactive() {
            return;
        }
        let result = if visible {
            execute!(std::io::stdout(), cursor::Show)
        } else {
            execute!(std::io::stdout(), cursor::Hide)
        };
        if let Err(err) = result {
            debug!(%err, visible, "could not change cursor visibility");
        }
    }
}

fn query_size() -> Result<TerminalSize, TermError> {
    let (columns, rows) = crossterm::terminal::size()?;
    if columns == 0 || rows == 0 {
        return Err(TermError::EmptySize { columns, rows });
    }
    Ok(TerminalSize::new(columns, rows))
}
