//! Errors surfaced by spinner sessions
//!
//! Misuse (unbalanced start/stop, stopping a session that is not on top of
//! the stack) is a panic, never one of these.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Runtime failures of the display machinery.
#[derive(Error, Debug)]
pub enum SpinnerError {
    /// The display worker thread could not be spawned.
    #[error("failed to start display worker: {0}")]
    Spawn(#[source] io::Error),

    /// Writing to the real terminal streams failed.
    #[error("display worker failed: {0}")]
    Io(#[from] io::Error),

    /// The worker thread is gone (panicked or never acknowledged).
    #[error("display worker terminated unexpectedly")]
    WorkerDied,

    /// The scoped block was interrupted (Ctrl-C).
    #[error("interrupted")]
    Interrupted,
}

impl From<SpinnerError> for io::Error {
    fn from(err: SpinnerError) -> Self {
        match err {
            SpinnerError::Io(inner) | SpinnerError::Spawn(inner) => inner,
            SpinnerError::Interrupted => {
                io::Error::new(io::ErrorKind::Interrupted, SpinnerError::Interrupted)
            }
            SpinnerError::WorkerDied => io::Error::other(SpinnerError::WorkerDied),
        }
    }
}

/// Classifies a scoped block's error as an interruption or a failure.
///
/// An interrupted block ends its spinner with `CANCELED`, any other error with
/// `FAILED`.
pub trait Interruption {
    /// Whether this error means the user interrupted the work.
    fn is_interrupted(&self) -> bool;
}

impl Interruption for SpinnerError {
    fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl Interruption for io::Error {
    fn is_interrupted(&self) -> bool {
        self.kind() == io::ErrorKind::Interrupted || chain_interrupted(self)
    }
}

impl Interruption for anyhow::Error {
    fn is_interrupted(&self) -> bool {
        self.chain().any(is_interrupt_cause)
    }
}

impl Interruption for Box<dyn StdError + Send + Sync> {
    fn is_interrupted(&self) -> bool {
        chain_interrupted(&**self)
    }
}

fn chain_interrupted(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        if is_interrupt_cause(cause) {
            return true;
        }
        current = cause.source();
    }
    false
}

fn is_interrupt_cause(err: &(dyn StdError + 'static)) -> bool {
    if let Some(spinner) = err.downcast_ref::<SpinnerError>() {
        return spinner.is_interrupted();
    }
    err.downcast_ref::<io::Error>()
        .is_some_and(|io| io.kind() == io::ErrorKind::Interrupted)
}
