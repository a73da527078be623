//! In-memory terminal streams
//!
//! A [`Capture`] stands in for the real stdout/stderr so a registry can be
//! driven headless and its transcript inspected afterwards.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spindle_term::Capabilities;

use crate::config::DisplayConfig;
use crate::registry::Registry;
use crate::worker::Streams;

/// A growable byte buffer shared between clones.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Discard everything written so far.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captured stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl Capture {
    /// Empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers appending to this capture.
    pub fn streams(&self) -> Streams {
        Streams {
            stdout: Box::new(self.stdout.clone()),
            stderr: Box::new(self.stderr.clone()),
        }
    }

    /// A registry whose real streams are this capture.
    pub fn registry(&self, caps: impl Capabilities + 'static, config: DisplayConfig) -> Registry {
        let capture = self.clone();
        Registry::builder()
            .capabilities(caps)
            .config(config)
            .streams(move || capture.streams())
            .build()
    }

    /// Captured stdout.
    pub fn stdout(&self) -> String {
        self.stdout.contents()
    }

    /// Captured stderr.
    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }

    /// Discard both transcripts.
    pub fn clear(&self) {
        self.stdout.clear();
        self.stderr.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let capture = Capture::new();
        let mut streams = capture.streams();
        write!(streams.stdout, "out").unwrap();
        writeln!(streams.stderr, "err").unwrap();

        let other = capture.clone();
        assert_eq!(other.stdout(), "out");
        assert_eq!(other.stderr(), "err\n");

        other.clear();
        assert_eq!(capture.stdout(), "");
    }
}
