use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::scheduler::logger::LOGGER;
use crate::scheduler::request::{RequestHandle, RequestStatus, Task};

/// Delays and repeat intervals, in milliseconds.
pub type ScheduleTimeMs = u64;

// The callback itself is held by `status`.
struct Request {
    id: u64,
    due: Instant,
    repeat: Option<Duration>,
    status: Arc<RequestStatus>,
}

// BinaryHeap is a max-heap: the earliest due time, then the lowest id, must
// compare greatest.
impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.due == other.due
    }
}

impl Eq for Request {}

struct SchedulerState {
    queue: BinaryHeap<Request>,
    next_id: u64,
    terminating: bool,
}

struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Runs callbacks on a dedicated worker thread after a delay, optionally
/// repeating them.
///
/// Requests with the same due time run in the order they were scheduled.
/// Callbacks may schedule further work on the same scheduler. Dropping the
/// scheduler cancels everything still queued and joins the worker; a callback
/// that was about to run when the scheduler shut down may still run.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    queue: BinaryHeap::new(),
                    next_id: 0,
                    terminating: false,
                }),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Schedules `callback` to run after `delay` ms, then every `repeat` ms
    /// when `repeat` is non-zero.
    pub fn schedule<F>(&self, callback: F, delay: ScheduleTimeMs, repeat: ScheduleTimeMs) -> RequestHandle
    where
        F: FnMut() + Send + 'static,
    {
        let repeat = (repeat > 0).then(|| Duration::from_millis(repeat));
        self.enqueue(Task::Repeat(Box::new(callback)), delay, repeat)
    }

    /// Schedules a callback that runs at most once.
    pub fn schedule_once<F>(&self, callback: F, delay: ScheduleTimeMs) -> RequestHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Task::Once(Some(Box::new(callback))), delay, None)
    }

    /// Runs `callback` on the worker thread as soon as possible.
    pub fn execute<F>(&self, callback: F) -> RequestHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_once(callback, 0)
    }

    fn enqueue(&self, task: Task, delay: ScheduleTimeMs, repeat: Option<Duration>) -> RequestHandle {
        let status = Arc::new(RequestStatus::new(task, repeat.is_some()));
        let handle = RequestHandle::new(status.clone());
        {
            let mut state = self.shared.lock();
            if state.terminating {
                drop(state);
                LOGGER.warn("Request scheduled after the scheduler shut down; it will never run");
                status.mark_cancelled();
                return handle;
            }
            let id = state.next_id;
            state.next_id = state.next_id.wrapping_add(1);
            state.queue.push(Request {
                id,
                due: Instant::now() + Duration::from_millis(delay),
                repeat,
                status,
            });
        }
        self.shared.wake.notify_one();
        self.ensure_worker();
        handle
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|poison| poison.into_inner());
        if worker.is_some() {
            return;
        }
        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("firebase-scheduler".into())
            .spawn(move || worker_loop(shared))
        {
            Ok(handle) => *worker = Some(handle),
            Err(err) => LOGGER.error(format!("Failed to start the scheduler thread: {err}")),
        }
    }

    /// Drops every queued request and stops the worker thread.
    ///
    /// A callback that is already running finishes first. Calling this from a
    /// callback stops the worker once that callback returns.
    pub fn cancel_all_and_shutdown_worker_thread(&self) {
        let drained = {
            let mut state = self.shared.lock();
            state.terminating = true;
            std::mem::take(&mut state.queue)
        };
        self.shared.wake.notify_all();
        if !drained.is_empty() {
            log::debug!("scheduler shutting down with {} queued request(s)", drained.len());
        }
        for request in &drained {
            request.status.mark_cancelled();
        }
        drop(drained);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                LOGGER.error("Scheduler thread terminated abnormally");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Scheduler")
            .field("queued", &state.queue.len())
            .field("terminating", &state.terminating)
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all_and_shutdown_worker_thread();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    while let Some(request) = next_due(&shared) {
        if let Some(request) = trigger(request) {
            let mut state = shared.lock();
            if !state.terminating {
                state.queue.push(request);
            }
        }
    }
}

/// Blocks until a request is due. Returns `None` once the scheduler terminates.
fn next_due(shared: &Shared) -> Option<Request> {
    let mut state = shared.lock();
    loop {
        if state.terminating {
            return None;
        }
        let wait = match state.queue.peek() {
            None => None,
            Some(request) => {
                let now = Instant::now();
                if request.due <= now {
                    return state.queue.pop();
                }
                Some(request.due - now)
            }
        };
        state = match wait {
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(|poison| poison.into_inner()),
            Some(timeout) => {
                shared
                    .wake
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(|poison| poison.into_inner())
                    .0
            }
        };
    }
}

/// Runs one request. Returns it back when it must be queued again.
fn trigger(mut request: Request) -> Option<Request> {
    let mut task = request.status.begin_run()?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
    let again = request.status.end_run(task);
    if outcome.is_err() {
        LOGGER.error(format!("Scheduled callback {} panicked", request.id));
    }
    let period = request.repeat.filter(|_| again)?;
    request.due = next_repeat(request.due, period, Instant::now());
    Some(request)
}

/// Keeps a fixed phase relative to the first run, unless the schedule fell
/// more than one period behind, in which case it restarts from `now`.
fn next_repeat(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if now > next + period {
        now + period
    } else {
        next
    }
}
