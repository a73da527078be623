//! Display Worker - Single-threaded terminal rendering
//!
//! All terminal output produced while a spinner is active is channeled
//! through one background thread. Producers (spinners, output sinks, log
//! writers on any thread) `post` events without blocking; the worker owns
//! the real stdout/stderr handles and is the only code writing to them, so
//! an animation frame and an unrelated `writeln!` can never tear each other.
//!
//! The loop consumes the next of {event, animation tick, queue closed}.
//! Ticks only exist once a current message is on screen: nothing is drawn
//! before the first message arrives.

use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use spindle_term::Capabilities;
use tokio::sync::oneshot;

use crate::error::SpinnerError;
use crate::line::{pad_to, truncate_visible, visible_len};
use crate::theme;

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is a display worker.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

/// Which logical output stream a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output: becomes the spinner's current message.
    Stdout,
    /// Standard error: promoted above the spinner line.
    Stderr,
}

/// Events consumed by the display worker, strictly in FIFO order.
#[derive(Debug)]
pub enum DisplayEvent {
    /// Replace the current message and redraw.
    Stdout(String),
    /// Print lines above the spinner, then redraw the spinner below them.
    Stderr(String),
    /// Print a finished status line and clear the current message.
    Commit(String),
    /// Flush both streams, then acknowledge.
    Sync(oneshot::Sender<()>),
    /// Print the final line (or erase the spinner line if empty) and exit.
    Stop(String),
}

impl DisplayEvent {
    /// Wrap text written to `stream`.
    pub fn output(stream: Stream, text: String) -> Self {
        match stream {
            Stream::Stdout => Self::Stdout(text),
            Stream::Stderr => Self::Stderr(text),
        }
    }
}

/// The real output handles a worker owns.
pub struct Streams {
    /// Destination of spinner frames and status lines.
    pub stdout: Box<dyn Write + Send>,
    /// Destination of promoted stderr lines.
    pub stderr: Box<dyn Write + Send>,
}

impl Streams {
    /// The process's standard output and standard error.
    pub fn real() -> Self {
        Self {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// The handle for one logical stream.
    pub fn get_mut(&mut self, stream: Stream) -> &mut (dyn Write + Send) {
        match stream {
            Stream::Stdout => &mut *self.stdout,
            Stream::Stderr => &mut *self.stderr,
        }
    }
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streams").finish_non_exhaustive()
    }
}

/// How a worker renders.
#[derive(Clone)]
pub struct WorkerOptions {
    /// Animation frames, cycled once per redraw.
    pub frames: &'static [&'static str],
    /// Animation interval.
    pub tick: Duration,
    /// Animate in place; otherwise write plain lines.
    pub animate: bool,
    /// Terminal queries (width for truncation, cursor visibility).
    pub caps: Arc<dyn Capabilities>,
}

impl fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("frames", &self.frames)
            .field("tick", &self.tick)
            .field("animate", &self.animate)
            .finish_non_exhaustive()
    }
}

/// A cloneable, non-blocking handle for posting events to a worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<DisplayEvent>,
}

impl EventSender {
    /// Enqueue an event. Fails only if the worker has exited.
    pub fn post(&self, event: DisplayEvent) -> Result<(), SpinnerError> {
        self.sender
            .send(event)
            .map_err(|_| SpinnerError::WorkerDied)
    }
}

/// Handle to the display worker thread
pub struct DisplayWorker {
    sender: EventSender,
    handle: Option<thread::JoinHandle<io::Result<()>>>,
}

impl DisplayWorker {
    /// Spawn a worker owning `streams`.
    ///
    /// # Errors
    ///
    /// [`SpinnerError::Spawn`] if the thread cannot be created.
    pub fn spawn(streams: Streams, options: WorkerOptions) -> Result<Self, SpinnerError> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("spindle-display".to_string())
            .spawn(move || {
                ON_WORKER.with(|flag| flag.set(true));
                let tick = options.tick;
                let animate = options.animate;
                let mut renderer = Renderer::new(streams, options);
                let result = run_event_loop(&receiver, &mut renderer, Ticker::new(tick, animate));
                renderer.restore_cursor();
                result
            })
            .map_err(SpinnerError::Spawn)?;

        Ok(Self {
            sender: EventSender { sender },
            handle: Some(handle),
        })
    }

    /// Get a cloneable sender for this worker
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Enqueue an event without blocking.
    pub fn post(&self, event: DisplayEvent) -> Result<(), SpinnerError> {
        self.sender.post(event)
    }

    /// Render `final_text` and wait until the worker has exited.
    ///
    /// The join is the acknowledgment: once this returns, the worker will
    /// never write again.
    ///
    /// # Errors
    ///
    /// [`SpinnerError::Io`] if the worker failed to write, or
    /// [`SpinnerError::WorkerDied`] if it panicked.
    pub fn stop(mut self, final_text: impl Into<String>) -> Result<(), SpinnerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // A failed send means the worker already exited; the join says why.
        let _ = self.sender.post(DisplayEvent::Stop(final_text.into()));
        match handle.join() {
            Ok(result) => result.map_err(SpinnerError::from),
            Err(_) => Err(SpinnerError::WorkerDied),
        }
    }
}

impl fmt::Debug for DisplayWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayWorker")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for DisplayWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Erase the spinner line and exit (ignore errors if already gone)
            let _ = self.sender.post(DisplayEvent::Stop(String::new()));
        }
    }
}

/// Animation schedule. Disarmed until there is something to animate.
#[derive(Debug)]
struct Ticker {
    interval: Duration,
    enabled: bool,
    next: Option<Instant>,
}

impl Ticker {
    fn new(interval: Duration, enabled: bool) -> Self {
        Self {
            interval,
            enabled,
            next: None,
        }
    }

    fn arm(&mut self) {
        if self.enabled && self.next.is_none() {
            self.next = Some(Instant::now() + self.interval);
        }
    }

    fn disarm(&mut self) {
        self.next = None;
    }

    fn advance(&mut self) {
        if let Some(next) = self.next {
            let now = Instant::now();
            let following = next + self.interval;
            // Skip missed ticks instead of bursting to catch up
            self.next = Some(if following <= now {
                now + self.interval
            } else {
                following
            });
        }
    }
}

enum Step {
    Event(DisplayEvent),
    Tick,
    Closed,
}

fn next_step(receiver: &mpsc::Receiver<DisplayEvent>, ticker: &Ticker) -> Step {
    match ticker.next {
        None => receiver.recv().map_or(Step::Closed, Step::Event),
        Some(deadline) => {
            let wait = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(wait) {
                Ok(event) => Step::Event(event),
                Err(RecvTimeoutError::Timeout) => Step::Tick,
                Err(RecvTimeoutError::Disconnected) => Step::Closed,
            }
        }
    }
}

/// Main event loop for the display worker
///
/// Any write failure ends the loop and is returned to whoever joins the
/// thread. The worker never logs: a tracing writer bound to the registry
/// would route back into this queue.
fn run_event_loop(
    receiver: &mpsc::Receiver<DisplayEvent>,
    renderer: &mut Renderer,
    mut ticker: Ticker,
) -> io::Result<()> {
    loop {
        match next_step(receiver, &ticker) {
            Step::Tick => {
                ticker.advance();
                renderer.draw()?;
            }
            Step::Event(DisplayEvent::Stdout(text)) => {
                if renderer.set_message(&text) {
                    ticker.arm();
                    renderer.draw()?;
                }
            }
            Step::Event(DisplayEvent::Stderr(text)) => renderer.promote(&text)?,
            Step::Event(DisplayEvent::Commit(text)) => {
                ticker.disarm();
                renderer.commit(&text)?;
            }
            Step::Event(DisplayEvent::Sync(ack)) => {
                renderer.flush()?;
                let _ = ack.send(());
            }
            Step::Event(DisplayEvent::Stop(text)) => return renderer.finish(&text),
            Step::Closed => return renderer.finish(""),
        }
    }
}

/// Worker-local render state. Never shared.
#[derive(Debug, Default)]
struct RenderState {
    /// Index of the next animation frame.
    frame: usize,
    /// Visible width of the line currently on screen (0 if none).
    prev_len: usize,
    /// Current message, empty until the first non-blank Stdout.
    message: String,
    /// Last message written in plain mode, to skip repeats.
    last_plain: String,
}

struct Renderer {
    streams: Streams,
    frames: &'static [&'static str],
    animate: bool,
    caps: Arc<dyn Capabilities>,
    cursor_hidden: bool,
    state: RenderState,
}

impl Renderer {
    fn new(streams: Streams, options: WorkerOptions) -> Self {
        let frames = if options.frames.is_empty() {
            theme::BRAILLE
        } else {
            options.frames
        };
        Self {
            streams,
            frames,
            animate: options.animate,
            caps: options.caps,
            cursor_hidden: false,
            state: RenderState::default(),
        }
    }

    fn next_frame(&mut self) -> &'static str {
        let glyph = self.frames[self.state.frame % self.frames.len()];
        self.state.frame = self.state.frame.wrapping_add(1);
        glyph
    }

    /// Adopt the last non-blank line of `text` as the current message.
    /// Blank payloads keep the previous message.
    fn set_message(&mut self, text: &str) -> bool {
        match text.lines().rev().map(str::trim).find(|line| !line.is_empty()) {
            Some(line) => {
                self.state.message.clear();
                self.state.message.push_str(line);
                true
            }
            None => false,
        }
    }

    /// Redraw the current message with the next frame.
    fn draw(&mut self) -> io::Result<()> {
        if self.state.message.is_empty() {
            return Ok(());
        }
        if !self.animate {
            return self.draw_plain();
        }
        if !self.cursor_hidden {
            self.caps.set_cursor_visible(false);
            self.cursor_hidden = true;
        }

        let glyph = self.next_frame();
        let line = format!("{glyph} {}", self.state.message);
        // One column short of the width so the cursor never wraps
        let max = usize::from(self.caps.terminal_size().columns)
            .saturating_sub(1)
            .max(1);
        let line = truncate_visible(&line, max);

        let out = &mut self.streams.stdout;
        write!(out, "\r{}", pad_to(&line, self.state.prev_len))?;
        out.flush()?;
        self.state.prev_len = visible_len(&line);
        Ok(())
    }

    fn draw_plain(&mut self) -> io::Result<()> {
        if self.state.message == self.state.last_plain {
            return Ok(());
        }
        let out = &mut self.streams.stdout;
        writeln!(out, "{}", self.state.message)?;
        out.flush()?;
        self.state.last_plain.clone_from(&self.state.message);
        Ok(())
    }

    /// Print stderr lines above the spinner, then bring the spinner back.
    fn promote(&mut self, text: &str) -> io::Result<()> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Ok(());
        }

        let err = &mut self.streams.stderr;
        let mut lines = text.lines();
        if let Some(first) = lines.next() {
            if self.animate && self.state.prev_len > 0 {
                // Overwrite whatever the spinner line currently shows
                write!(err, "\r{}\n", pad_to(first, self.state.prev_len))?;
            } else {
                writeln!(err, "{first}")?;
            }
        }
        for line in lines {
            writeln!(err, "{line}")?;
        }
        err.flush()?;

        self.state.prev_len = 0;
        if self.animate { self.draw() } else { Ok(()) }
    }

    /// Write `text` as a terminated line over the spinner line.
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let out = &mut self.streams.stdout;
        if self.animate {
            write!(out, "\r{}\n", pad_to(text, self.state.prev_len))?;
        } else {
            writeln!(out, "{text}")?;
        }
        out.flush()?;
        self.state.prev_len = 0;
        Ok(())
    }

    fn commit(&mut self, text: &str) -> io::Result<()> {
        let text = text.trim();
        if !text.is_empty() {
            self.write_line(text)?;
        }
        self.state.message.clear();
        self.state.last_plain.clear();
        Ok(())
    }

    fn finish(&mut self, text: &str) -> io::Result<()> {
        let text = text.trim();
        if !text.is_empty() {
            self.write_line(text)?;
        } else if self.animate && self.state.prev_len > 0 {
            let blank = " ".repeat(self.state.prev_len);
            let out = &mut self.streams.stdout;
            write!(out, "\r{blank}\r")?;
            self.state.prev_len = 0;
        }
        self.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.streams.stdout.flush()?;
        self.streams.stderr.flush()
    }

    fn restore_cursor(&mut self) {
        if self.cursor_hidden {
            self.caps.set_cursor_visible(true);
            self.cursor_hidden = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;
    use spindle_term::StaticCapabilities;

    const FOREVER: Duration = Duration::from_secs(3600);

    fn spawn(capture: &Capture, caps: StaticCapabilities, tick: Duration) -> DisplayWorker {
        let options = WorkerOptions {
            frames: theme::BRAILLE,
            tick,
            animate: caps.interactive,
            caps: Arc::new(caps),
        };
        DisplayWorker::spawn(capture.streams(), options).unwrap()
    }

    fn interactive(capture: &Capture) -> DisplayWorker {
        spawn(capture, StaticCapabilities::interactive(80, 24), FOREVER)
    }

    fn sync(worker: &DisplayWorker) {
        let (tx, rx) = oneshot::channel();
        worker.post(DisplayEvent::Sync(tx)).unwrap();
        rx.blocking_recv().unwrap();
    }

    #[test]
    fn test_event_from_stream() {
        assert!(matches!(
            DisplayEvent::output(Stream::Stdout, "a".into()),
            DisplayEvent::Stdout(_)
        ));
        assert!(matches!(
            DisplayEvent::output(Stream::Stderr, "a".into()),
            DisplayEvent::Stderr(_)
        ));
    }

    #[test]
    fn test_nothing_drawn_before_first_message() {
        let capture = Capture::new();
        let worker = spawn(&capture, StaticCapabilities::interactive(80, 24), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(30));
        sync(&worker);
        assert_eq!(capture.stdout(), "");

        worker.stop("").unwrap();
        assert_eq!(capture.stdout(), "");
    }

    #[test]
    fn test_redraw_pads_over_longer_line() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stdout("Training...".into())).unwrap();
        worker.post(DisplayEvent::Stdout("step 1".into())).unwrap();
        worker.stop("done").unwrap();

        assert_eq!(
            capture.stdout(),
            "\r⠇ Training...\r⠏ step 1     \rdone    \n"
        );
    }

    #[test]
    fn test_blank_stdout_keeps_message() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stdout("Working...".into())).unwrap();
        worker.post(DisplayEvent::Stdout("   \n".into())).unwrap();
        worker.stop("").unwrap();

        assert_eq!(capture.stdout(), "\r⠇ Working...\r            \r");
    }

    #[test]
    fn test_multiline_stdout_uses_last_line() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stdout("first\nsecond\n\n".into())).unwrap();
        worker.stop("x").unwrap();
        assert!(capture.stdout().starts_with("\r⠇ second"));
    }

    #[test]
    fn test_stderr_promoted_above_spinner() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stdout("Working...".into())).unwrap();
        worker
            .post(DisplayEvent::Stderr("warn one\nwarn two\n".into()))
            .unwrap();
        worker.stop("fin").unwrap();

        assert_eq!(capture.stderr(), "\rwarn one    \nwarn two\n");
        assert_eq!(
            capture.stdout(),
            "\r⠇ Working...\r⠏ Working...\rfin         \n"
        );
    }

    #[test]
    fn test_stderr_before_any_message_draws_no_spinner() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stderr("early\n".into())).unwrap();
        worker.stop("").unwrap();
        assert_eq!(capture.stderr(), "early\n");
        assert_eq!(capture.stdout(), "");
    }

    #[test]
    fn test_commit_then_resume() {
        let capture = Capture::new();
        let worker = interactive(&capture);
        worker.post(DisplayEvent::Stdout("inner...".into())).unwrap();
        worker.post(DisplayEvent::Commit("ok inner.".into())).unwrap();
        worker.post(DisplayEvent::Stdout("outer...".into())).unwrap();
        worker.stop("ok outer.").unwrap();

        assert_eq!(
            capture.stdout(),
            "\r⠇ inner...\rok inner. \n\r⠏ outer...\rok outer. \n"
        );
    }

    #[test]
    fn test_truncates_to_terminal_width() {
        let capture = Capture::new();
        let worker = spawn(&capture, StaticCapabilities::interactive(20, 24), FOREVER);
        worker.post(DisplayEvent::Stdout("x".repeat(60))).unwrap();
        worker.stop("").unwrap();

        let drawn = capture.stdout();
        let first = drawn.split('\r').nth(1).unwrap();
        assert_eq!(visible_len(first), 19);
    }

    #[test]
    fn test_indented_stderr_fits_terminal() {
        let capture = Capture::new();
        let worker = spawn(&capture, StaticCapabilities::interactive(20, 24), FOREVER);
        worker.post(DisplayEvent::Stdout("x".repeat(40))).unwrap();
        worker.post(DisplayEvent::Stderr("        indented\n".into())).unwrap();
        worker.stop("").unwrap();

        let promoted = capture.stderr();
        let first = promoted.lines().next().unwrap().trim_start_matches('\r');
        assert!(first.starts_with("        indented"));
        assert_eq!(first.chars().count(), 19);
    }

    #[test]
    fn test_ticks_animate_current_message() {
        let capture = Capture::new();
        let worker = spawn(&capture, StaticCapabilities::interactive(80, 24), Duration::from_millis(5));
        worker.post(DisplayEvent::Stdout("spin".into())).unwrap();
        thread::sleep(Duration::from_millis(80));
        worker.stop("").unwrap();

        let drawn = capture.stdout();
        assert!(drawn.matches(" spin").count() >= 3, "{drawn:?}");
        assert!(drawn.contains("⠇ spin"));
        assert!(drawn.contains("⠏ spin"));
    }

    #[test]
    fn test_plain_mode() {
        let capture = Capture::new();
        let worker = spawn(&capture, StaticCapabilities::plain(), Duration::from_millis(5));
        worker.post(DisplayEvent::Stdout("a".into())).unwrap();
        worker.post(DisplayEvent::Stdout("a".into())).unwrap();
        thread::sleep(Duration::from_millis(20));
        worker.post(DisplayEvent::Stdout("b".into())).unwrap();
        worker.post(DisplayEvent::Stderr("e\n".into())).unwrap();
        worker.stop("fin").unwrap();

        assert_eq!(capture.stdout(), "a\nb\nfin\n");
        assert_eq!(capture.stderr(), "e\n");
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_surfaces_on_stop() {
        let streams = Streams {
            stdout: Box::new(Broken),
            stderr: Box::new(io::sink()),
        };
        let options = WorkerOptions {
            frames: theme::BRAILLE,
            tick: FOREVER,
            animate: true,
            caps: Arc::new(StaticCapabilities::interactive(80, 24)),
        };
        let worker = DisplayWorker::spawn(streams, options).unwrap();
        worker.post(DisplayEvent::Stdout("boom".into())).unwrap();

        match worker.stop("never printed") {
            Err(SpinnerError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_ticker_disarmed_until_armed() {
        let mut ticker = Ticker::new(Duration::from_millis(10), true);
        assert!(ticker.next.is_none());
        ticker.arm();
        let first = ticker.next.unwrap();
        ticker.advance();
        assert!(ticker.next.unwrap() > first);
        ticker.disarm();
        assert!(ticker.next.is_none());

        let mut plain = Ticker::new(Duration::from_millis(10), false);
        plain.arm();
        assert!(plain.next.is_none());
    }
}
