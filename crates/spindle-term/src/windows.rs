//! Windows console shim

use crate::TermError;

/// Try to switch the console into virtual terminal processing mode.
///
/// crossterm performs the `SetConsoleMode(ENABLE_VIRTUAL_TERMINAL_PROCESSING)`
/// dance and caches the answer; consoles older than Windows 10 refuse it.
pub(crate) fn enable_ansi() -> Result<(), TermError> {
    if crossterm::ansi_support::supports_ansi() {
        Ok(())
    } else {
        Err(TermError::AnsiUnavailable)
    }
}
