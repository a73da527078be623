//! Spinner Theme - Design system constants
//!
//! This module defines all visual elements a spinner draws:
//! - Animation frames
//! - Status icons
//! - Status colors
//!
//! Centralizing these keeps the worker and the session API free of
//! literals and makes an alternative look a one-struct change.

use crossterm::style::{Color, Stylize};

/// Braille frames, cycled once per render.
pub const BRAILLE: &[&str] = &["⠇", "⠏", "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];

/// Frames for terminals whose font lacks the braille block.
pub const ASCII: &[&str] = &["|", "/", "-", "\\"];

/// Default theme for spinners
#[derive(Debug, Clone)]
pub struct Theme {
    /// Animation frames, cycled in order
    pub frames: &'static [&'static str],
    /// Status icons
    pub icons: Icons,
    /// Status colors
    pub colors: ColorScheme,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            frames: BRAILLE,
            icons: Icons::default(),
            colors: ColorScheme::default(),
        }
    }
}

impl Theme {
    /// Same theme with plain ASCII frames
    pub fn ascii() -> Self {
        Self {
            frames: ASCII,
            ..Self::default()
        }
    }

    /// Wrap `glyph` in `color` when `enabled`, otherwise return it bare.
    pub fn paint(glyph: &str, color: Color, enabled: bool) -> String {
        if enabled {
            glyph.with(color).to_string()
        } else {
            glyph.to_string()
        }
    }
}

/// Color scheme for final status lines
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Completed successfully
    pub done: Color,
    /// Failed
    pub failed: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            done: Color::DarkGreen,
            failed: Color::DarkRed,
        }
    }
}

/// Status icons for terminal states
#[derive(Debug, Clone)]
pub struct Icons {
    /// Completed successfully (✔)
    pub done: &'static str,
    /// Failed (✘)
    pub failed: &'static str,
    /// Canceled by the user (!)
    pub canceled: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            done: "✔",
            failed: "✘",
            canceled: "!",
        }
    }
}
