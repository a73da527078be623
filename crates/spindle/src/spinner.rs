//! Spinner sessions
//!
//! A [`Spinner`] is one scoped session on a [`Registry`]: `start` pushes it
//! and shows `"{message}..."`, `display` swaps the interim text, and `stop`
//! pops it with a final status line such as `✔ DONE {message}.`.
//!
//! The scoped helpers ([`Spinner::run`], [`Spinner::run_async`]) pick the
//! status from how the block ended and guarantee exactly one stop.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{error, warn};

use crate::error::{Interruption, SpinnerError};
use crate::interrupt::Watch;
use crate::registry::{Registry, SessionId};
use crate::theme::Theme;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The work completed.
    Done,
    /// The user interrupted the work.
    Canceled,
    /// The work failed.
    Failed,
}

/// Lifecycle of a spinner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinnerState {
    /// Constructed, not yet started.
    Created,
    /// Registered and animating.
    Running,
    /// Stopped for the given reason. Terminal.
    Stopped(StopReason),
}

/// A spinner session.
#[derive(Debug)]
pub struct Spinner {
    id: SessionId,
    registry: Registry,
    /// Shown on start and in the final status line. Fixed for the session.
    principal: String,
    current: String,
    color: bool,
    state: SpinnerState,
}

impl Spinner {
    /// A spinner on the process-wide registry.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_registry(Registry::global().clone(), message)
    }

    /// A spinner on an explicit registry.
    pub fn with_registry(registry: Registry, message: impl Into<String>) -> Self {
        let principal = message.into();
        Self {
            id: SessionId::allocate(),
            registry,
            current: principal.clone(),
            principal,
            color: false,
            state: SpinnerState::Created,
        }
    }

    /// The principal message.
    pub fn message(&self) -> &str {
        &self.principal
    }

    /// The most recently displayed message.
    pub fn current_message(&self) -> &str {
        &self.current
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SpinnerState {
        self.state
    }

    /// A cloneable handle for displaying messages from elsewhere.
    pub fn handle(&self) -> SpinnerHandle {
        SpinnerHandle {
            registry: self.registry.clone(),
            id: self.id,
        }
    }

    /// Register the session and show the principal message.
    ///
    /// # Errors
    ///
    /// If the display worker cannot be spawned or has died.
    ///
    /// # Panics
    ///
    /// If the spinner was already started.
    pub fn start(&mut self) -> Result<(), SpinnerError> {
        assert!(
            self.state == SpinnerState::Created,
            "spinner {:?} started while {:?}",
            self.principal,
            self.state
        );
        self.color = self.registry.color_enabled();
        self.registry.register(self.id)?;
        self.state = SpinnerState::Running;
        self.current = format!("{}...", self.principal);
        self.show()
    }

    /// Show an interim message. The principal message is unchanged.
    ///
    /// While an inner spinner is running the message is remembered and shown
    /// once the inner one stops. Before `start` it is only remembered.
    ///
    /// # Errors
    ///
    /// [`SpinnerError::Interrupted`] once Ctrl-C was pressed inside a
    /// [`Spinner::run`] scope on this registry, or a worker failure.
    pub fn display(&mut self, message: impl Into<String>) -> Result<(), SpinnerError> {
        self.current = message.into();
        if self.state != SpinnerState::Running {
            return Ok(());
        }
        if self.registry.is_interrupted() {
            return Err(SpinnerError::Interrupted);
        }
        self.show()
    }

    fn show(&self) -> Result<(), SpinnerError> {
        self.registry.display(self.id, self.current.clone())
    }

    /// The final status line for `reason`.
    pub fn final_line(&self, reason: StopReason) -> String {
        let theme = &self.registry.config().theme;
        let (icon, word) = match reason {
            StopReason::Done => (
                Theme::paint(theme.icons.done, theme.colors.done, self.color),
                "DONE",
            ),
            StopReason::Failed => (
                Theme::paint(theme.icons.failed, theme.colors.failed, self.color),
                "FAILED",
            ),
            StopReason::Canceled => (theme.icons.canceled.to_string(), "CANCELED"),
        };
        format!("{icon} {word} {}.", self.principal)
    }

    /// Deregister the session, leaving its final status line on screen.
    ///
    /// The spinner counts as stopped even when this returns an error.
    ///
    /// # Errors
    ///
    /// If the worker died or failed to write the final line.
    ///
    /// # Panics
    ///
    /// If the spinner is not running, or an inner spinner started after this
    /// one is still running.
    pub fn stop(&mut self, reason: StopReason) -> Result<(), SpinnerError> {
        assert!(
            self.state == SpinnerState::Running,
            "spinner {:?} stopped while {:?}",
            self.principal,
            self.state
        );
        let result = self.registry.deregister(self.id, self.final_line(reason));
        self.state = SpinnerState::Stopped(reason);
        result
    }

    /// Stop with [`StopReason::Done`].
    ///
    /// # Errors
    ///
    /// See [`Spinner::stop`].
    pub fn finish(&mut self) -> Result<(), SpinnerError> {
        self.stop(StopReason::Done)
    }

    /// Stop with [`StopReason::Failed`].
    ///
    /// # Errors
    ///
    /// See [`Spinner::stop`].
    pub fn fail(&mut self) -> Result<(), SpinnerError> {
        self.stop(StopReason::Failed)
    }

    /// Stop with [`StopReason::Canceled`].
    ///
    /// # Errors
    ///
    /// See [`Spinner::stop`].
    pub fn cancel(&mut self) -> Result<(), SpinnerError> {
        self.stop(StopReason::Canceled)
    }

    fn stop_if_running(&mut self, reason: StopReason) -> Result<(), SpinnerError> {
        if self.state == SpinnerState::Running {
            self.stop(reason)
        } else {
            Ok(())
        }
    }

    /// Run `f` inside the spinner.
    ///
    /// `Ok` stops with `DONE`; an error stops with `CANCELED` if it reports
    /// an interruption and `FAILED` otherwise, and is returned unchanged. A
    /// panic stops with `FAILED` and keeps unwinding.
    ///
    /// Ctrl-C cannot stop `f` directly. Unless
    /// [`DisplayConfig::catch_interrupts`](crate::DisplayConfig::catch_interrupts)
    /// is off, it makes the next [`display`](Spinner::display) fail with
    /// [`SpinnerError::Interrupted`], and a block that returns `Ok` anyway
    /// still ends `CANCELED` with that error. A second Ctrl-C before the
    /// scope ends exits the process with status 130.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a [`SpinnerError`] from starting or stopping
    /// the spinner.
    pub fn run<T, E, F>(mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: Interruption + From<SpinnerError>,
    {
        run_scoped(&mut self, f)
    }

    /// Await `fut` inside the spinner, stopping with `CANCELED` on Ctrl-C.
    ///
    /// `f` receives a [`SpinnerHandle`] for interim messages. On Ctrl-C the
    /// future is dropped and [`SpinnerError::Interrupted`] is returned,
    /// converted into the caller's error type.
    ///
    /// # Errors
    ///
    /// Whatever the future returns, [`SpinnerError::Interrupted`] on Ctrl-C,
    /// or a [`SpinnerError`] from starting or stopping the spinner.
    pub async fn run_async<T, E, F, Fut>(mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(SpinnerHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Interruption + From<SpinnerError>,
    {
        let _watch = Watch::begin(self.registry.interrupt_flag(), false);
        self.start()?;
        let fut = f(self.handle());
        let result = tokio::select! {
            result = fut => result,
            Ok(()) = tokio::signal::ctrl_c() => Err(E::from(SpinnerError::Interrupted)),
        };
        let result = heed_interrupt(&self, result);
        conclude(&mut self, result)
    }
}

impl AsMut<Spinner> for Spinner {
    fn as_mut(&mut self) -> &mut Spinner {
        self
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if self.state != SpinnerState::Running {
            return;
        }
        let reason = if thread::panicking() {
            StopReason::Failed
        } else {
            StopReason::Done
        };
        if let Err(err) = self.stop(reason) {
            error!(%err, spinner = %self.principal, "failed to stop spinner");
        }
    }
}

/// Start `session`, run `f`, and stop with the reason its outcome implies.
fn run_scoped<S, T, E, F>(session: &mut S, f: F) -> Result<T, E>
where
    S: AsMut<Spinner>,
    F: FnOnce(&mut S) -> Result<T, E>,
    E: Interruption + From<SpinnerError>,
{
    let registry = &session.as_mut().registry;
    let _watch = Watch::begin(registry.interrupt_flag(), registry.config().catch_interrupts);
    session.as_mut().start()?;
    match panic::catch_unwind(AssertUnwindSafe(|| f(&mut *session))) {
        Ok(result) => {
            let result = heed_interrupt(session.as_mut(), result);
            conclude(session.as_mut(), result)
        }
        Err(payload) => {
            if let Err(err) = session.as_mut().stop_if_running(StopReason::Failed) {
                warn!(%err, "failed to stop spinner after panic");
            }
            panic::resume_unwind(payload)
        }
    }
}

/// A block that finished after Ctrl-C without noticing it still counts as
/// interrupted.
fn heed_interrupt<T, E>(spinner: &Spinner, result: Result<T, E>) -> Result<T, E>
where
    E: From<SpinnerError>,
{
    match result {
        Ok(_) if spinner.registry.is_interrupted() => Err(E::from(SpinnerError::Interrupted)),
        other => other,
    }
}

fn conclude<T, E>(spinner: &mut Spinner, result: Result<T, E>) -> Result<T, E>
where
    E: Interruption + From<SpinnerError>,
{
    match result {
        Ok(value) => {
            spinner.stop_if_running(StopReason::Done)?;
            Ok(value)
        }
        Err(err) => {
            let reason = if err.is_interrupted() {
                StopReason::Canceled
            } else {
                StopReason::Failed
            };
            // The block's own error wins over a failure to render its end
            if let Err(stop_err) = spinner.stop_if_running(reason) {
                warn!(err = %stop_err, "failed to stop spinner");
            }
            Err(err)
        }
    }
}

/// Displays messages for a spinner it does not own.
///
/// Messages sent after the spinner stopped are ignored.
#[derive(Debug, Clone)]
pub struct SpinnerHandle {
    registry: Registry,
    id: SessionId,
}

impl SpinnerHandle {
    /// Show an interim message.
    ///
    /// # Errors
    ///
    /// As [`Spinner::display`].
    pub fn display(&self, message: impl Into<String>) -> Result<(), SpinnerError> {
        if self.registry.is_interrupted() {
            return Err(SpinnerError::Interrupted);
        }
        self.registry.display(self.id, message)
    }
}

/// A spinner that shows a percentage in front of its message.
#[derive(Debug)]
pub struct ProgressSpinner {
    spinner: Spinner,
    current: u64,
}

impl ProgressSpinner {
    /// A progress spinner on the process-wide registry.
    pub fn new(message: impl Into<String>) -> Self {
        Self::from(Spinner::new(message))
    }

    /// A progress spinner on an explicit registry.
    pub fn with_registry(registry: Registry, message: impl Into<String>) -> Self {
        Self::from(Spinner::with_registry(registry, message))
    }

    /// Accumulated count.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Add `count` to the running total and redisplay.
    ///
    /// With a non-zero `total` the message reads `[ 42%] {message}...`;
    /// otherwise it is just `{message}...`.
    ///
    /// # Errors
    ///
    /// As [`Spinner::display`].
    pub fn update(&mut self, count: u64, total: Option<u64>) -> Result<(), SpinnerError> {
        self.current = self.current.saturating_add(count);
        let message = match total.filter(|&total| total > 0) {
            Some(total) => format!(
                "[{:>3}%] {}...",
                percent(self.current, total),
                self.spinner.message()
            ),
            None => format!("{}...", self.spinner.message()),
        };
        self.spinner.display(message)
    }

    /// Run `f` inside the spinner; see [`Spinner::run`].
    ///
    /// # Errors
    ///
    /// As [`Spinner::run`].
    pub fn run<T, E, F>(mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: Interruption + From<SpinnerError>,
    {
        run_scoped(&mut self, f)
    }
}

impl From<Spinner> for ProgressSpinner {
    fn from(spinner: Spinner) -> Self {
        Self {
            spinner,
            current: 0,
        }
    }
}

impl AsMut<Spinner> for ProgressSpinner {
    fn as_mut(&mut self) -> &mut Spinner {
        &mut self.spinner
    }
}

impl Deref for ProgressSpinner {
    type Target = Spinner;

    fn deref(&self) -> &Spinner {
        &self.spinner
    }
}

impl DerefMut for ProgressSpinner {
    fn deref_mut(&mut self) -> &mut Spinner {
        &mut self.spinner
    }
}

fn percent(current: u64, total: u64) -> u64 {
    (u128::from(current) * 100 / u128::from(total)) as u64
}
