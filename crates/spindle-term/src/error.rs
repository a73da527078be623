//! Errors raised while querying the terminal
//!
//! None of these escape the crate: every query recovers to a conservative
//! default and logs the cause at `debug` level.

use thiserror::Error;

/// Why a terminal query could not be answered.
#[derive(Error, Debug)]
pub enum TermError {
    /// The underlying query failed.
    #[error("terminal query failed: {0}")]
    Io(#[from] std::io::Error),

    /// The terminal answered with a zero dimension.
    #[error("terminal reported an empty size ({columns}x{rows})")]
    EmptySize {
        /// Reported columns.
        columns: u16,
        /// Reported rows.
        rows: u16,
    },

    /// `TERM` names a terminal without escape sequence support.
    #[error("TERM={0} does not honor escape sequences")]
    DumbTerminal(String),

    /// The Windows console refused virtual terminal processing.
    #[error("console does not support virtual terminal processing")]
    AnsiUnavailable,
}
