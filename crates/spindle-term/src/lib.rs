//! Terminal capability detection
//!
//! This crate answers the handful of questions the spinner core asks about
//! the hosting terminal: is the output interactive, are escape sequences
//! honored, how large is the screen, and can the cursor be hidden.
//!
//! The core only ever sees the [`Capabilities`] trait. A platform-specific
//! [`NativeTerminal`] is selected at compile time; [`StaticCapabilities`]
//! gives fixed answers for tests and headless rendering.

mod error;
mod native;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::sync::Arc;

pub use error::TermError;
pub use native::NativeTerminal;

/// Width and height of the terminal, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of columns.
    pub columns: u16,
    /// Number of rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Size assumed whenever the real one cannot be queried.
    pub const DEFAULT: Self = Self {
        columns: 79,
        rows: 24,
    };

    /// Create a size from columns and rows.
    pub const fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Capability queries consumed by the spinner core.
///
/// Implementations never fail: a query that cannot be answered falls back to
/// the conservative default (non-interactive, [`TerminalSize::DEFAULT`], no
/// escape sequences).
pub trait Capabilities: Send + Sync {
    /// Whether the output sink is an interactive terminal.
    fn is_interactive(&self) -> bool;

    /// Whether ANSI escape sequences (colors, cursor control) are honored.
    fn supports_ansi_escapes(&self) -> bool;

    /// Current terminal dimensions.
    fn terminal_size(&self) -> TerminalSize;

    /// Show or hide the cursor. A no-op where unsupported.
    fn set_cursor_visible(&self, visible: bool);
}

impl<T: Capabilities + ?Sized> Capabilities for Arc<T> {
    fn is_interactive(&self) -> bool {
        (**self).is_interactive()
    }
    fn supports_ansi_escapes(&self) -> bool {
        (**self).supports_ansi_escapes()
    }
    fn terminal_size(&self) -> TerminalSize {
        (**self).terminal_size()
    }
    fn set_cursor_visible(&self, visible: bool) {
        (**self).set_cursor_visible(visible);
    }
}

/// A provider with fixed answers (e.g., tests, output captured to memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCapabilities {
    /// Reported interactivity.
    pub interactive: bool,
    /// Reported ANSI support.
    pub ansi: bool,
    /// Reported size.
    pub size: TerminalSize,
}

impl StaticCapabilities {
    /// An interactive, ANSI-capable terminal of the given size.
    pub const fn interactive(columns: u16, rows: u16) -> Self {
        Self {
            interactive: true,
            ansi: true,
            size: TerminalSize::new(columns, rows),
        }
    }

    /// A non-interactive sink (pipe, file) with the default size.
    pub const fn plain() -> Self {
        Self {
            interactive: false,
            ansi: false,
            size: TerminalSize::DEFAULT,
        }
    }
}

impl Capabilities for StaticCapabilities {
    fn is_interactive(&self) -> bool {
        self.interactive
    }
    fn supports_ansi_escapes(&self) -> bool {
        self.ansi
    }
    fn terminal_size(&self) -> TerminalSize {
        self.size
    }
    fn set_cursor_visible(&self, _: bool) {}
}

/// The capability provider for the platform this binary was built for.
pub fn detect() -> Arc<dyn Capabilities> {
    Arc::new(NativeTerminal::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size() {
        assert_eq!(TerminalSize::default(), TerminalSize::new(79, 24));
    }

    #[test]
    fn test_static_capabilities() {
        let caps = StaticCapabilities::interactive(120, 40);
        assert!(caps.is_interactive());
        assert!(caps.supports_ansi_escapes());
        assert_eq!(caps.terminal_size().columns, 120);

        let plain = StaticCapabilities::plain();
        assert!(!plain.is_interactive());
        assert!(!plain.supports_ansi_escapes());
        assert_eq!(plain.terminal_size(), TerminalSize::DEFAULT);
    }

    #[test]
    fn test_arc_forwarding() {
        let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::interactive(10, 5));
        let shared = Arc::new(caps);
        assert!(shared.is_interactive());
        assert_eq!(shared.terminal_size(), TerminalSize::new(10, 5));
        shared.set_cursor_visible(false);
    }
}
