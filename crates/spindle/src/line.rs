//! Line Formatter - visible width arithmetic for in-place redraws
//!
//! The worker redraws the spinner line with a carriage return instead of
//! clearing the screen. That only works if every redraw covers at least as
//! many columns as the previous one, and never so many that the terminal
//! wraps. Both need the *visible* width of a line: escape sequences take no
//! columns, wide glyphs take two.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// SGR reset, appended when truncation cuts a styled line short.
const RESET: &str = "\x1b[0m";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
});

/// Remove CSI escape sequences (colors, cursor movement) from `text`.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Number of terminal columns `text` occupies once escape sequences and
/// trailing whitespace are removed.
///
/// Leading whitespace is kept: an indented line covers those columns too.
pub fn visible_len(text: &str) -> usize {
    strip_ansi(text).trim_end().width()
}

/// Pad `text` with spaces so it covers at least `prev_len` visible columns.
///
/// Used on every redraw so a shorter line fully overwrites a longer one.
pub fn pad_to(text: &str, prev_len: usize) -> String {
    let len = visible_len(text);
    let mut padded = String::with_capacity(text.len() + prev_len.saturating_sub(len));
    padded.push_str(text);
    if len < prev_len {
        padded.extend(std::iter::repeat_n(' ', prev_len - len));
    }
    padded
}

/// Cut `text` down to at most `max` visible columns.
///
/// Escape sequences are kept intact. If any were seen, a reset is appended so
/// a color opened before the cut does not bleed into the next line.
pub fn truncate_visible(text: &str, max: usize) -> Cow<'_, str> {
    if strip_ansi(text).width() <= max {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut width = 0;
    let mut styled = false;
    let mut last = 0;

    for escape in ANSI_ESCAPE.find_iter(text) {
        if !push_visible(&mut out, &text[last..escape.start()], &mut width, max) {
            last = text.len();
            break;
        }
        out.push_str(escape.as_str());
        styled = true;
        last = escape.end();
    }
    if last < text.len() {
        push_visible(&mut out, &text[last..], &mut width, max);
    }

    if styled {
        out.push_str(RESET);
    }
    Cow::Owned(out)
}

/// Append characters of `segment` while they fit. Returns `false` once full.
fn push_visible(out: &mut String, segment: &str, width: &mut usize, max: usize) -> bool {
    for ch in segment.chars() {
        let w = ch.width().unwrap_or(0);
        if *width + w > max {
            return false;
        }
        *width += w;
        out.push(ch);
    }
    true
}
