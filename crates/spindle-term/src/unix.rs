//! Unix terminal shim

use crate::TermError;

/// Escape sequences are native on Unix terminals; only `TERM=dumb` opts out.
pub(crate) fn enable_ansi() -> Result<(), TermError> {
    check_term(std::env::var("TERM").ok().as_deref())
}

fn check_term(term: Option<&str>) -> Result<(), TermError> {
    match term {
        Some(name @ "dumb") => Err(TermError::DumbTerminal(name.to_string())),
        _ => Ok(()),
    }
}
