//! Exactly-once execution on a lossy event loop.
//!
//! Some UI event loops expose a "run this on the loop thread" primitive that
//! may silently drop submissions (for example while the window is still being
//! created). [`dispatch_once`] keeps resubmitting the same task until the loop
//! picks one copy up, and guarantees only that first copy runs.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use std::thread;
//! use hardened_fetch::dispatch::{dispatch_once, EventLoop, Task};
//!
//! struct Channel(mpsc::Sender<Task>);
//!
//! impl EventLoop for Channel {
//!     fn dispatch(&self, task: Task) {
//!         let _ = self.0.send(task);
//!     }
//! }
//!
//! let (tx, rx) = mpsc::channel::<Task>();
//! let ui = thread::spawn(move || {
//!     for task in rx {
//!         task();
//!     }
//! });
//!
//! let event_loop = Channel(tx);
//! dispatch_once(&event_loop, || println!("on the loop thread"));
//! drop(event_loop);
//! ui.join().unwrap();
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

/// Default delay between resubmissions.
pub const DEFAULT_RESUBMIT_INTERVAL: Duration = Duration::from_millis(100);

/// A unit of work submitted to an [`EventLoop`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An event loop that runs submitted tasks on its own thread.
pub trait EventLoop {
    /// Submits `task`. The loop may drop it without running it.
    fn dispatch(&self, task: Task);
}

impl<L: EventLoop + ?Sized> EventLoop for Arc<L> {
    fn dispatch(&self, task: Task) {
        (**self).dispatch(task);
    }
}

struct OnceState {
    fired: AtomicBool,
    task: Mutex<Option<Task>>,
    claimed: Mutex<bool>,
    claimed_cv: Condvar,
}

impl OnceState {
    fn new(task: Task) -> Self {
        Self {
            fired: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
            claimed: Mutex::new(false),
            claimed_cv: Condvar::new(),
        }
    }

    /// Runs on the loop thread. Only the first copy to win the CAS proceeds.
    fn run(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("duplicate submission ignored");
            return;
        }
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        // Wake the submitter before running the task.
        *self.claimed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.claimed_cv.notify_all();

        if let Some(task) = task {
            task();
        }
    }

    /// Waits up to `interval` for a copy to be claimed.
    fn wait_claimed(&self, interval: Duration) -> bool {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if *claimed {
            return true;
        }
        let (claimed, _) = self
            .claimed_cv
            .wait_timeout_while(claimed, interval, |claimed| !*claimed)
            .unwrap_or_else(PoisonError::into_inner);
        *claimed
    }
}

fn submission(state: &Arc<OnceState>) -> Task {
    let state = Arc::clone(state);
    Box::new(move || state.run())
}

/// Runs `task` exactly once on `event_loop`, resubmitting every
/// [`DEFAULT_RESUBMIT_INTERVAL`] until the loop accepts it.
///
/// Blocks the calling thread until the task has been claimed by the loop.
/// Never call it from the loop thread itself.
pub fn dispatch_once<L, F>(event_loop: &L, task: F)
where
    L: EventLoop + ?Sized,
    F: FnOnce() + Send + 'static,
{
    dispatch_once_with_interval(event_loop, task, DEFAULT_RESUBMIT_INTERVAL);
}

/// [`dispatch_once`] with a custom resubmission interval.
pub fn dispatch_once_with_interval<L, F>(event_loop: &L, task: F, interval: Duration)
where
    L: EventLoop + ?Sized,
    F: FnOnce() + Send + 'static,
{
    let state = Arc::new(OnceState::new(Box::new(task)));
    let mut submissions: u32 = 0;
    loop {
        event_loop.dispatch(submission(&state));
        submissions += 1;
        if state.wait_claimed(interval) {
            break;
        }
        trace!(submissions, "task not yet claimed, resubmitting");
    }
    debug!(submissions, "task claimed by event loop");
}

/// Runs the resubmission loop of [`dispatch_once`] on a dedicated thread.
///
/// The returned handle finishes once the task has been claimed.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_dispatch_once<L, F>(event_loop: Arc<L>, task: F) -> io::Result<JoinHandle<()>>
where
    L: EventLoop + Send + Sync + ?Sized + 'static,
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("dispatch-once".to_string())
        .spawn(move || dispatch_once(&*event_loop, task))
}
