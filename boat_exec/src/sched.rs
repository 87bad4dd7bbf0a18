//! # Scheduled tasks
//!
//! Every periodic activity of the server runs on its own named thread, controlled through a
//! `TaskHandle`. A `TaskSlot` holds the handle of one kind of activity so that starting a new
//! instance replaces the previous one.
//!
//! The velocity watchdog is a separate one-shot timer which is pushed back every time it is
//! rearmed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use util::sync::lock;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a running task.
///
/// Dropping the handle signals the task to stop without waiting for it.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    finished: Arc<AtomicBool>,
}

/// Passed to a task's body, lets it wait while remaining cancellable.
#[derive(Debug)]
pub struct TaskContext {
    stop_rx: Receiver<()>,
}

/// Holds at most one running instance of a named activity.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    handle: Mutex<Option<TaskHandle>>,
}

/// One-shot timer calling a function if it isn't rearmed within its timeout.
#[derive(Debug)]
pub struct Watchdog {
    shared: Arc<WatchdogShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct WatchdogShared {
    timeout: Duration,
    state: Mutex<WatchdogState>,
    cvar: Condvar,
}

#[derive(Debug, Default)]
struct WatchdogState {
    deadline: Option<Instant>,
    shutdown: bool,
}

/// Sets the finished flag when the task's thread exits, even by panicking.
struct FinishGuard(Arc<AtomicBool>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Returned by a periodic task's tick to say whether it should run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    Continue,
    Stop,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Could not spawn the thread for task {0}: {1}")]
    SpawnFailed(String, std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run `body` once on a new named thread.
pub fn spawn_once<F>(name: &str, body: F) -> Result<TaskHandle, TaskError>
where
    F: FnOnce(&TaskContext) + Send + 'static,
{
    let (stop_tx, stop_rx) = channel();
    let finished = Arc::new(AtomicBool::new(false));
    let guard = FinishGuard(finished.clone());

    let thread = thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let _guard = guard;
            body(&TaskContext { stop_rx });
        })
        .map_err(|e| TaskError::SpawnFailed(name.into(), e))?;

    debug!("Task {} started", name);

    Ok(TaskHandle {
        name: name.into(),
        stop_tx: Some(stop_tx),
        thread: Some(thread),
        finished,
    })
}

/// Call `tick` every `period`, starting immediately, until it returns `TaskFlow::Stop` or the task
/// is cancelled.
///
/// Ticks are scheduled at a fixed rate. If a tick overruns the next one starts straight away and
/// the schedule restarts from there.
pub fn spawn_periodic<F>(name: &str, period: Duration, mut tick: F) -> Result<TaskHandle, TaskError>
where
    F: FnMut() -> TaskFlow + Send + 'static,
{
    let task_name = name.to_string();

    spawn_once(name, move |ctx| {
        let mut next_tick = Instant::now();

        loop {
            if ctx.is_cancelled() {
                break;
            }

            if tick() == TaskFlow::Stop {
                debug!("Task {} stopped itself", task_name);
                break;
            }

            next_tick += period;
            let now = Instant::now();

            match next_tick.checked_duration_since(now) {
                Some(d) => {
                    if !ctx.wait(d) {
                        break;
                    }
                }
                None => {
                    warn!(
                        "Task {} overran by {:.06} s",
                        task_name,
                        (now - next_tick).as_secs_f64()
                    );
                    next_tick = now;
                }
            }
        }

        trace!("Task {} exiting", task_name);
    })
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the task's body has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Stop the task and wait for it to exit.
    ///
    /// A task may cancel its own handle, in which case it is only signalled.
    pub fn cancel(mut self) {
        // Dropping the sender wakes any pending wait
        self.stop_tx.take();

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }

            if thread.join().is_err() {
                warn!("Task {} panicked", self.name);
            } else {
                debug!("Task {} cancelled", self.name);
            }
        }
    }
}

impl TaskContext {
    /// Sleep for the given duration. Returns `false` if the task was cancelled meanwhile.
    pub fn wait(&self, duration: Duration) -> bool {
        matches!(
            self.stop_rx.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        !matches!(self.stop_rx.try_recv(), Err(TryRecvError::Empty))
    }
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancel the running instance, if any, then start a new one with `spawn`.
    ///
    /// Both happen under the slot's lock so two concurrent starts can't leave two instances
    /// running.
    pub fn start<F>(&self, spawn: F) -> Result<(), TaskError>
    where
        F: FnOnce() -> Result<TaskHandle, TaskError>,
    {
        let mut handle = lock(&self.handle);

        if let Some(old) = handle.take() {
            old.cancel();
        }

        *handle = Some(spawn()?);

        Ok(())
    }

    /// Cancel the running instance. Returns `true` if one was still running.
    pub fn cancel(&self) -> bool {
        // Release the slot before joining
        let old = lock(&self.handle).take();

        match old {
            Some(h) => {
                let was_running = !h.is_finished();
                h.cancel();
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Watchdog {
    /// Start a disarmed watchdog.
    ///
    /// `on_expire` runs on the watchdog's thread while the watchdog is locked, so it must not call
    /// back into the watchdog.
    pub fn spawn<F>(name: &str, timeout: Duration, on_expire: F) -> Result<Self, TaskError>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(WatchdogShared {
            timeout,
            state: Mutex::new(WatchdogState::default()),
            cvar: Condvar::new(),
        });
        let shared_thread = shared.clone();

        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || watchdog_thread(shared_thread, on_expire))
            .map_err(|e| TaskError::SpawnFailed(name.into(), e))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Push the deadline back to one timeout from now.
    pub fn rearm(&self) {
        self.rearm_with(|| ())
    }

    /// Run `f` and push the deadline back, atomically with respect to expiry.
    ///
    /// A value written by `f` can therefore never be overwritten by an expiry that was already
    /// due.
    pub fn rearm_with<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let mut state = lock(&self.shared.state);
        let result = f();
        state.deadline = Some(Instant::now() + self.shared.timeout);
        self.shared.cvar.notify_all();
        result
    }

    pub fn disarm(&self) {
        lock(&self.shared.state).deadline = None;
        self.shared.cvar.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.shared.state).deadline.is_some()
    }

    /// Stop the watchdog thread. Further rearms have no effect.
    pub fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.state);
            state.shutdown = true;
            state.deadline = None;
        }
        self.shared.cvar.notify_all();

        if let Some(thread) = lock(&self.thread).take() {
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn watchdog_thread<F: Fn()>(shared: Arc<WatchdogShared>, on_expire: F) {
    let mut state = lock(&shared.state);

    loop {
        if state.shutdown {
            break;
        }

        state = match state.deadline {
            None => wait(&shared.cvar, state, None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    trace!("Watchdog expired");
                    on_expire();
                    state
                } else {
                    wait(&shared.cvar, state, Some(deadline - now))
                }
            }
        };
    }
}

/// Wait on the condition variable, recovering the guard if the lock was poisoned.
fn wait<'a>(
    cvar: &Condvar,
    guard: MutexGuard<'a, WatchdogState>,
    timeout: Option<Duration>,
) -> MutexGuard<'a, WatchdogState> {
    match timeout {
        Some(t) => match cvar.wait_timeout(guard, t) {
            Ok((g, _)) => g,
            Err(poisoned) => poisoned.into_inner().0,
        },
        None => cvar
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
