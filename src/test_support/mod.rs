//! Test utilities shared across crate-level unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting semaphore used to wait for callbacks that run on other threads.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    pub fn post(&self) {
        *self.count.lock().unwrap() += 1;
        self.available.notify_one();
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Waits for a post. Returns false if none arrived within `timeout`.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self.available.wait_timeout(count, deadline - now).unwrap().0;
        }
        *count -= 1;
        true
    }
}

/// Returns an app name no other test in this process uses.
pub fn unique_app_name(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_counts_posts() {
        let sem = Semaphore::new(1);
        sem.post();
        assert!(sem.try_wait());
        assert!(sem.timed_wait(Duration::from_millis(1)));
        assert!(!sem.try_wait());
        assert!(!sem.timed_wait(Duration::from_millis(5)));
    }
}
