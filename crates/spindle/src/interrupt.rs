//! Ctrl-C handling for blocking spinner scopes
//!
//! A blocking closure cannot be preempted, so an interrupt is delivered
//! cooperatively: the watcher flags every registry with a running scope, and
//! the next `display` (or `update`) on those registries fails with
//! [`SpinnerError::Interrupted`](crate::SpinnerError::Interrupted). The
//! scope then ends with `CANCELED` through the normal stop path, which also
//! shows the cursor again.
//!
//! Once a SIGINT handler is installed the default "terminate" action is gone
//! for the rest of the process, so the watcher handles every Ctrl-C from
//! then on. With no scope running, or on a second Ctrl-C before the flagged
//! scopes have ended, it shows the cursor and exits with status 130.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, mpsc};
use std::thread;

use tokio::runtime::Builder;
use tracing::{debug, warn};

/// Exit status of a process ended by SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

/// One entry per running scope; a registry appears once per nesting level.
static SCOPES: Mutex<Vec<Arc<InterruptFlag>>> = Mutex::new(Vec::new());

/// Whether the watcher thread is listening.
static WATCHER: OnceLock<bool> = OnceLock::new();

/// Interrupt state of one registry.
#[derive(Debug, Default)]
pub(crate) struct InterruptFlag {
    pending: AtomicBool,
}

impl InterruptFlag {
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn raise(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Flagged,
    Exit,
}

/// Decide what one Ctrl-C does to the running scopes.
fn deliver(scopes: &[Arc<InterruptFlag>]) -> Delivery {
    if scopes.is_empty() || scopes.iter().any(|flag| flag.is_pending()) {
        return Delivery::Exit;
    }
    for flag in scopes {
        flag.raise();
    }
    Delivery::Flagged
}

fn scopes() -> MutexGuard<'static, Vec<Arc<InterruptFlag>>> {
    SCOPES.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a registry as running a scope until dropped.
///
/// The flag is cleared when the registry's outermost scope ends, so an
/// interrupt never leaks into the next one.
#[derive(Debug)]
pub(crate) struct Watch {
    flag: Arc<InterruptFlag>,
}

impl Watch {
    /// Start watching `flag`, installing the process-wide watcher first if
    /// `install` is set.
    pub(crate) fn begin(flag: &Arc<InterruptFlag>, install: bool) -> Self {
        if install {
            ensure_watcher();
        }
        scopes().push(Arc::clone(flag));
        Self {
            flag: Arc::clone(flag),
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        let mut scopes = scopes();
        if let Some(index) = scopes.iter().position(|flag| Arc::ptr_eq(flag, &self.flag)) {
            scopes.swap_remove(index);
        }
        if !scopes.iter().any(|flag| Arc::ptr_eq(flag, &self.flag)) {
            self.flag.clear();
        }
    }
}

fn ensure_watcher() {
    WATCHER.get_or_init(|| match spawn_watcher() {
        Ok(()) => {
            debug!("interrupt watcher installed");
            true
        }
        Err(err) => {
            warn!(%err, "Ctrl-C will not cancel blocking spinners");
            false
        }
    });
}

/// Spawn the watcher and wait until its handler is registered, so a Ctrl-C
/// right after a scope starts is already caught.
fn spawn_watcher() -> io::Result<()> {
    let (ready_tx, ready_rx) = mpsc::channel();

    thread::Builder::new()
        .name("spindle-interrupt".to_string())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let listener = {
                let _context = runtime.enter();
                platform::listen()
            };
            let mut listener = match listener {
                Ok(listener) => listener,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            runtime.block_on(async move {
                while listener.recv().await.is_some() {
                    if deliver(&scopes()) == Delivery::Exit {
                        exit_interrupted();
                    }
                }
            });
        })?;

    ready_rx
        .recv()
        .map_err(|_| io::Error::other("interrupt watcher exited during setup"))?
}

fn exit_interrupted() -> ! {
    spindle_term::detect().set_cursor_visible(true);
    let _ = writeln!(io::stderr());
    std::process::exit(INTERRUPTED_EXIT)
}

#[cfg(unix)]
mod platform {
    use std::io;
    use tokio::signal::unix::{Signal, SignalKind, signal};

    pub(super) fn listen() -> io::Result<Signal> {
        signal(SignalKind::interrupt())
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use tokio::signal::windows::{CtrlC, ctrl_c};

    pub(super) fn listen() -> io::Result<CtrlC> {
        ctrl_c()
    }
}
