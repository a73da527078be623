//! spindle - nestable terminal spinners
//!
//! Spinners announce long-running work on a single terminal line and leave a
//! status line such as `✔ DONE Downloading MNIST.` behind when it finishes.
//! Spinners nest, and ordinary program output written while one is active
//! is printed above the animated line instead of tearing it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐
//! │   Spinner   │      │ OutputSink  │  (stdout/stderr writes, tracing)
//! └──────┬──────┘      └──────┬──────┘
//!        │ start/display/stop │ write
//!        ▼                    ▼
//! ┌─────────────────────────────────┐
//! │            Registry             │  Session stack, owns the worker
//! └────────────────┬────────────────┘
//!                  │ sends events
//!                  ▼
//! ┌─────────────────────────────────┐
//! │          DisplayWorker          │  Single thread, only writer
//! └────────────────┬────────────────┘
//!                  │ renders with
//!                  ▼
//! ┌─────────────┐      ┌─────────────┐
//! │    line     │      │    Theme    │  Padding/truncation, glyphs/colors
//! └─────────────┘      └─────────────┘
//! ```
//!
//! Terminal facts (interactivity, ANSI support, size, cursor) come from the
//! [`spindle_term`] crate through the [`Capabilities`] trait.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Write;
//! use spindle::{ProgressSpinner, Spinner, SpinnerError};
//!
//! fn main() -> Result<(), SpinnerError> {
//!     Spinner::new("Preparing samples").run(|spin| {
//!         spin.display("Loading batch")?;
//!         writeln!(spindle::stderr(), "warning: slow disk")?;
//!         Ok::<_, SpinnerError>(())
//!     })?;
//!
//!     ProgressSpinner::new("Downloading MNIST").run(|progress| {
//!         for _ in 0..10 {
//!             progress.update(1, Some(10))?;
//!         }
//!         Ok::<_, SpinnerError>(())
//!     })
//! }
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod capture;
pub mod config;
pub mod error;
mod interrupt;
pub mod line;
pub mod registry;
pub mod sink;
pub mod spinner;
pub mod theme;
pub mod worker;

pub use config::{ColorChoice, DisplayConfig};
pub use error::{Interruption, SpinnerError};
pub use registry::{Registry, RegistryBuilder, SessionId};
pub use sink::OutputSink;
pub use spindle_term::{Capabilities, StaticCapabilities, TerminalSize};
pub use spinner::{ProgressSpinner, Spinner, SpinnerHandle, SpinnerState, StopReason};
pub use theme::Theme;

/// Standard output routed through the global registry.
pub fn stdout() -> OutputSink {
    Registry::global().stdout()
}

/// Standard error routed through the global registry.
pub fn stderr() -> OutputSink {
    Registry::global().stderr()
}
