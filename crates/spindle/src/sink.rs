//! Output Interceptor - `Write` handles that route through the registry
//!
//! Code that should not tear a running spinner writes to an [`OutputSink`]
//! instead of `std::io::stdout()`. While a session is registered the text
//! becomes a display event; otherwise it goes straight to the real stream.
//!
//! `write!` issues one `write` call per format fragment, so a sink holds
//! bytes back until it sees a newline and then posts every complete line in
//! one event. `flush` (or dropping the sink) posts a trailing partial line.

use std::fmt;
use std::io::{self, Write};

use crate::registry::Registry;
use crate::worker::Stream;

/// A line-buffered writer bound to one logical stream of a [`Registry`].
pub struct OutputSink {
    registry: Registry,
    stream: Stream,
    pending: Vec<u8>,
}

impl OutputSink {
    pub(crate) fn new(registry: Registry, stream: Stream) -> Self {
        Self {
            registry,
            stream,
            pending: Vec::new(),
        }
    }

    /// The logical stream this sink represents.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.registry.route(self.stream, text)
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("stream", &self.stream)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if let Some(newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let rest = self.pending.split_off(newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            self.send(&complete)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let partial = std::mem::take(&mut self.pending);
        self.send(&partial)
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
