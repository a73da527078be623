//! Session Registry - one display worker, a stack of spinner sessions
//!
//! The registry enforces the process-wide shape of spinner output:
//!
//! 1. **One worker**: the first registered session spawns the display
//!    worker; the last deregistered one stops it. Nested sessions share it.
//! 2. **LIFO sessions**: only the innermost session may stop. Anything else
//!    is a caller bug and panics, since quietly repairing the stack would
//!    hide unbalanced start/stop pairs.
//! 3. **Interception window**: output sinks created from the registry route
//!    through the worker while at least one session is registered, and
//!    write straight through otherwise.
//!
//! All state sits behind one mutex. Nothing is logged while it is held,
//! because a tracing writer bound to the registry takes the same lock.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use spindle_term::Capabilities;
use tokio::sync::oneshot;
use tracing::{debug, trace};
use tracing_subscriber::fmt::MakeWriter;

use crate::config::DisplayConfig;
use crate::error::SpinnerError;
use crate::interrupt::InterruptFlag;
use crate::sink::OutputSink;
use crate::worker::{self, DisplayEvent, DisplayWorker, EventSender, Stream, Streams, WorkerOptions};

/// Produces the real output streams handed to each new worker.
pub type StreamFactory = Arc<dyn Fn() -> Streams + Send + Sync>;

/// Singleton registry shared by spinners that were not given one.
static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Identity of one spinner session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// A process-unique identifier.
    pub fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct SessionEntry {
    id: SessionId,
    /// Last message the session displayed, reposted when an inner session stops.
    message: String,
}

/// Invariant: `worker.is_some() == !sessions.is_empty()`.
#[derive(Debug, Default)]
struct RegistryState {
    worker: Option<DisplayWorker>,
    sessions: Vec<SessionEntry>,
}

struct Shared {
    state: Mutex<RegistryState>,
    caps: Arc<dyn Capabilities>,
    config: DisplayConfig,
    streams: StreamFactory,
    interrupt: Arc<InterruptFlag>,
}

/// A cloneable handle to a session registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Shared>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry on the real terminal, configured from the environment.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The registry shared by every spinner created without one.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Terminal capabilities this registry renders for.
    pub fn capabilities(&self) -> &dyn Capabilities {
        &*self.inner.caps
    }

    /// Display settings.
    pub fn config(&self) -> &DisplayConfig {
        &self.inner.config
    }

    /// Whether status glyphs should be colored, resolved now.
    pub fn color_enabled(&self) -> bool {
        self.inner.config.color.resolve(&*self.inner.caps)
    }

    /// Number of registered sessions.
    pub fn depth(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether output sinks are currently routed through a worker.
    pub fn is_intercepting(&self) -> bool {
        self.lock().worker.is_some()
    }

    /// Whether Ctrl-C was pressed while a scope on this registry was running.
    ///
    /// Cleared when the outermost scope ends.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupt.is_pending()
    }

    pub(crate) fn interrupt_flag(&self) -> &Arc<InterruptFlag> {
        &self.inner.interrupt
    }

    /// A sink for standard output bound to this registry.
    pub fn stdout(&self) -> OutputSink {
        OutputSink::new(self.clone(), Stream::Stdout)
    }

    /// A sink for standard error bound to this registry.
    pub fn stderr(&self) -> OutputSink {
        OutputSink::new(self.clone(), Stream::Stderr)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Assertions run before any mutation, so a poisoned state is intact
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(&self) -> Result<DisplayWorker, SpinnerError> {
        let shared = &self.inner;
        let options = WorkerOptions {
            frames: shared.config.theme.frames,
            tick: shared.config.tick,
            animate: shared.caps.is_interactive() && !shared.config.force_plain,
            caps: Arc::clone(&shared.caps),
        };
        DisplayWorker::spawn((shared.streams)(), options)
    }

    /// Push a session, starting the worker if it is the first.
    ///
    /// # Errors
    ///
    /// [`SpinnerError::Spawn`] if the worker thread cannot be created.
    ///
    /// # Panics
    ///
    /// If `id` is already registered.
    pub fn register(&self, id: SessionId) -> Result<(), SpinnerError> {
        let (started, depth) = {
            let mut state = self.lock();
            assert!(
                state.sessions.iter().all(|entry| entry.id != id),
                "spinner session {id} registered twice"
            );
            let started = state.worker.is_none();
            if started {
                state.worker = Some(self.spawn_worker()?);
            }
            state.sessions.push(SessionEntry {
                id,
                message: String::new(),
            });
            (started, state.sessions.len())
        };

        if started {
            debug!("display worker started, intercepting output");
        }
        debug!(session = %id, depth, "session registered");
        Ok(())
    }

    /// Show `message` for session `id`.
    ///
    /// Only the innermost session reaches the screen; an outer session's
    /// message is remembered and reappears when the sessions above it stop.
    /// Unknown sessions are ignored.
    ///
    /// # Errors
    ///
    /// [`SpinnerError::WorkerDied`] if the worker is gone.
    pub fn display(&self, id: SessionId, message: impl Into<String>) -> Result<(), SpinnerError> {
        let message = message.into();
        let posted = {
            let mut state = self.lock();
            let Some(index) = state.sessions.iter().position(|entry| entry.id == id) else {
                return Ok(());
            };
            state.sessions[index].message.clone_from(&message);
            let innermost = index + 1 == state.sessions.len();
            match state.worker.as_ref() {
                Some(worker) if innermost => {
                    worker.post(DisplayEvent::Stdout(message))?;
                    true
                }
                _ => false,
            }
        };

        trace!(session = %id, posted, "display");
        Ok(())
    }

    /// Pop session `id` and render its final line.
    ///
    /// If it was the last session the worker prints `final_message`, stops,
    /// and sinks write straight through again. Otherwise `final_message` is
    /// committed as a finished line and the next-outer session's message
    /// becomes the active spinner line.
    ///
    /// # Errors
    ///
    /// If the worker died, or failed writing to the real streams.
    ///
    /// # Panics
    ///
    /// If `id` is not the innermost registered session.
    pub fn deregister(
        &self,
        id: SessionId,
        final_message: impl Into<String>,
    ) -> Result<(), SpinnerError> {
        let final_message = final_message.into();
        let mut state = self.lock();

        let top = state.sessions.last().map(|entry| entry.id);
        assert!(
            top == Some(id),
            "spinner sessions must stop in LIFO order: {id} is not the innermost session (innermost: {})",
            top.map_or_else(|| "none".to_string(), |top| top.to_string())
        );
        state.sessions.pop();
        let depth = state.sessions.len();

        let resumed = state.sessions.last().map(|outer| outer.message.clone());
        if let Some(resumed) = resumed {
            let result = match state.worker.as_ref() {
                Some(worker) => worker
                    .post(DisplayEvent::Commit(final_message))
                    .and_then(|()| worker.post(DisplayEvent::Stdout(resumed))),
                None => Err(SpinnerError::WorkerDied),
            };
            drop(state);
            debug!(session = %id, depth, "session deregistered, outer session resumed");
            return result;
        }

        // Joined under the lock: sinks wait here rather than writing to the
        // real streams while the worker is still printing its last line.
        let result = state
            .worker
            .take()
            .map_or(Ok(()), |worker| worker.stop(final_message));
        drop(state);

        debug!(session = %id, "session deregistered, display worker stopped");
        result
    }

    /// Block until the worker has rendered everything posted so far.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`sync_async`](Self::sync_async) there.
    pub fn sync(&self) {
        if let Some(rx) = self.request_sync() {
            let _ = rx.blocking_recv();
        }
    }

    /// Async version of [`sync`](Self::sync).
    pub async fn sync_async(&self) {
        if let Some(rx) = self.request_sync() {
            let _ = rx.await;
        }
    }

    fn request_sync(&self) -> Option<oneshot::Receiver<()>> {
        let sender = self.lock().worker.as_ref().map(DisplayWorker::sender)?;
        let (tx, rx) = oneshot::channel();
        sender.post(DisplayEvent::Sync(tx)).ok()?;
        Some(rx)
    }

    /// Deliver text written to one of this registry's sinks.
    pub(crate) fn route(&self, stream: Stream, text: String) -> io::Result<()> {
        if worker::on_worker_thread() {
            // The worker owns the streams; queueing to itself would be pointless
            return self.write_direct(stream, &text);
        }

        let state = self.lock();
        match state.worker.as_ref().map(DisplayWorker::sender) {
            Some(sender) => post_output(&sender, stream, text),
            // Held across the write so no worker starts mid-line
            None => self.write_direct(stream, &text),
        }
    }

    fn write_direct(&self, stream: Stream, text: &str) -> io::Result<()> {
        let mut streams = (self.inner.streams)();
        let out = streams.get_mut(stream);
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

fn post_output(sender: &EventSender, stream: Stream, text: String) -> io::Result<()> {
    sender
        .post(DisplayEvent::output(stream, text))
        .map_err(|err| io::Error::new(io::ErrorKind::BrokenPipe, err))
}

impl<'a> MakeWriter<'a> for Registry {
    type Writer = OutputSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.stderr()
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    caps: Option<Arc<dyn Capabilities>>,
    config: Option<DisplayConfig>,
    streams: Option<StreamFactory>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Terminal capabilities (default: the native terminal).
    pub fn capabilities(mut self, caps: impl Capabilities + 'static) -> Self {
        self.caps = Some(Arc::new(caps));
        self
    }

    /// Display settings (default: [`DisplayConfig::from_env`]).
    pub fn config(mut self, config: DisplayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Real output streams (default: the process's stdout and stderr).
    pub fn streams(mut self, factory: impl Fn() -> Streams + Send + Sync + 'static) -> Self {
        self.streams = Some(Arc::new(factory));
        self
    }

    /// Finish building.
    pub fn build(self) -> Registry {
        let streams: StreamFactory = match self.streams {
            Some(factory) => factory,
            None => Arc::new(Streams::real),
        };
        Registry {
            inner: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                caps: self.caps.unwrap_or_else(spindle_term::detect),
                config: self.config.unwrap_or_else(DisplayConfig::from_env),
                streams,
                interrupt: Arc::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;
    use spindle_term::StaticCapabilities;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    fn registry(capture: &Capture) -> Registry {
        let config = DisplayConfig {
            tick: Duration::from_secs(3600),
            ..DisplayConfig::default()
        };
        capture.registry(StaticCapabilities::interactive(80, 24), config)
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::allocate(), SessionId::allocate());
    }

    #[test]
    fn test_worker_lives_while_sessions_exist() {
        let capture = Capture::new();
        let reg = registry(&capture);
        let (outer, inner) = (SessionId::allocate(), SessionId::allocate());

        assert!(!reg.is_intercepting());
        reg.register(outer).unwrap();
        reg.register(inner).unwrap();
        assert_eq!(reg.depth(), 2);
        assert!(reg.is_intercepting());

        reg.deregister(inner, "inner done").unwrap();
        assert_eq!(reg.depth(), 1);
        assert!(reg.is_intercepting());

        reg.deregister(outer, "outer done").unwrap();
        assert_eq!(reg.depth(), 0);
        assert!(!reg.is_intercepting());
    }

    #[test]
    fn test_out_of_order_deregister_panics() {
        let capture = Capture::new();
        let reg = registry(&capture);
        let (outer, inner) = (SessionId::allocate(), SessionId::allocate());
        reg.register(outer).unwrap();
        reg.register(inner).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| reg.deregister(outer, "")));
        assert!(result.is_err());

        // The stack is untouched and still usable
        assert_eq!(reg.depth(), 2);
        reg.deregister(inner, "").unwrap();
        reg.deregister(outer, "").unwrap();
        assert!(!reg.is_intercepting());
    }

    #[test]
    fn test_double_register_panics() {
        let capture = Capture::new();
        let reg = registry(&capture);
        let id = SessionId::allocate();
        reg.register(id).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| reg.register(id)));
        assert!(result.is_err());
        reg.deregister(id, "").unwrap();
    }

    #[test]
    fn test_outer_display_waits_for_inner_stop() {
        let capture = Capture::new();
        let reg = registry(&capture);
        let (outer, inner) = (SessionId::allocate(), SessionId::allocate());
        reg.register(outer).unwrap();
        reg.display(outer, "outer...").unwrap();
        reg.register(inner).unwrap();
        reg.display(inner, "inner...").unwrap();
        reg.display(outer, "outer changed...").unwrap();
        reg.sync();
        assert!(!capture.stdout().contains("outer changed"));

        reg.deregister(inner, "inner done.").unwrap();
        reg.sync();
        let out = capture.stdout();
        let done = out.find("inner done.").unwrap();
        assert!(out[done..].contains("outer changed..."));

        reg.deregister(outer, "").unwrap();
    }

    #[test]
    fn test_display_unknown_session_is_ignored() {
        let capture = Capture::new();
        let reg = registry(&capture);
        reg.display(SessionId::allocate(), "nobody").unwrap();
        assert_eq!(capture.stdout(), "");
    }

    #[test]
    fn test_sync_without_worker_returns() {
        let capture = Capture::new();
        registry(&capture).sync();
    }
}
