use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

pub(crate) enum Task {
    Once(Option<Box<dyn FnOnce() + Send + 'static>>),
    Repeat(Box<dyn FnMut() + Send + 'static>),
}

impl Task {
    pub(crate) fn run(&mut self) {
        match self {
            Task::Once(callback) => {
                if let Some(callback) = callback.take() {
                    callback();
                }
            }
            Task::Repeat(callback) => callback(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Once(_) => f.write_str("Task::Once"),
            Task::Repeat(_) => f.write_str("Task::Repeat"),
        }
    }
}

#[derive(Debug, Default)]
struct StatusState {
    cancelled: bool,
    triggered: bool,
    // Thread currently running the callback, if any.
    running: Option<ThreadId>,
}

/// State shared between a queued request and the handles pointing at it.
///
/// The callback lives here rather than in the queue entry, so cancelling a
/// request releases it (and everything it captured) without waiting for the
/// entry's due time. Lock order is `state` then `task`.
#[derive(Debug)]
pub(crate) struct RequestStatus {
    state: Mutex<StatusState>,
    idle: Condvar,
    task: Mutex<Option<Task>>,
    repeat: bool,
}

impl RequestStatus {
    pub(crate) fn new(task: Task, repeat: bool) -> Self {
        Self {
            state: Mutex::new(StatusState::default()),
            idle: Condvar::new(),
            task: Mutex::new(Some(task)),
            repeat,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<Task>> {
        self.task.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Marks the request as running on the current thread and hands out its
    /// callback. Returns `None` when it was cancelled and must be dropped instead.
    pub(crate) fn begin_run(&self) -> Option<Task> {
        let mut state = self.lock();
        if state.cancelled {
            return None;
        }
        let task = self.task_slot().take()?;
        state.triggered = true;
        state.running = Some(thread::current().id());
        Some(task)
    }

    /// Clears the running mark and takes the callback back. Returns true when
    /// the request should be queued again.
    pub(crate) fn end_run(&self, task: Task) -> bool {
        let mut state = self.lock();
        state.running = None;
        self.idle.notify_all();
        if self.repeat && !state.cancelled {
            *self.task_slot() = Some(task);
            return true;
        }
        drop(state);
        drop(task);
        false
    }

    pub(crate) fn mark_cancelled(&self) {
        self.lock().cancelled = true;
        self.release_task();
    }

    fn release_task(&self) {
        let task = self.task_slot().take();
        drop(task);
    }

    fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.cancelled || (!self.repeat && state.triggered) {
            return false;
        }
        state.cancelled = true;
        if self.repeat {
            // Wait out an in-flight run so nothing fires after we return,
            // unless the callback is cancelling itself.
            let current = thread::current().id();
            while state.running.is_some_and(|runner| runner != current) {
                state = self
                    .idle
                    .wait(state)
                    .unwrap_or_else(|poison| poison.into_inner());
            }
        }
        drop(state);
        self.release_task();
        true
    }
}

/// Handle to a request queued on a [`Scheduler`](super::Scheduler).
///
/// The default handle points at nothing.
#[derive(Clone, Debug, Default)]
pub struct RequestHandle {
    status: Option<Arc<RequestStatus>>,
}

impl RequestHandle {
    pub(crate) fn new(status: Arc<RequestStatus>) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Attempts to stop the callback from running again.
    ///
    /// Returns true when this call prevented a future run. Returns false when
    /// the request was already cancelled, or when a one-shot request has
    /// already been triggered. Cancelling a repeating request waits for a run
    /// in progress on another thread, so no run starts after this returns.
    ///
    /// A successful cancel drops the callback immediately, even when its due
    /// time is far away.
    pub fn cancel(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.cancel())
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.lock().cancelled)
    }

    pub fn is_triggered(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.lock().triggered)
    }
}
