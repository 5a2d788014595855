use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::logger::LOGGER;

type CleanupCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies an object registered with a [`CleanupNotifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CleanupKey(u64);

impl CleanupKey {
    /// Returns a key no other call in this process returns.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CleanupKey(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Key derived from the address of a shared allocation.
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        CleanupKey(Arc::as_ptr(object).cast::<()>() as usize as u64)
    }
}

/// Teardown callbacks that objects owned by an App register so they are
/// detached when the App goes away.
///
/// Each key holds at most one callback; registering again replaces it.
/// [`cleanup_all`](Self::cleanup_all) runs every callback once, in
/// registration order, with no lock held, so callbacks may unregister other
/// objects. Dropping the notifier runs `cleanup_all`.
#[derive(Default)]
pub struct CleanupNotifier {
    entries: Mutex<Vec<(CleanupKey, CleanupCallback)>>,
}

impl CleanupNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(CleanupKey, CleanupCallback)>> {
        self.entries.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn register_object<F>(&self, key: CleanupKey, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let replaced = {
            let mut entries = self.lock();
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(entry) => Some(std::mem::replace(&mut entry.1, Box::new(callback))),
                None => {
                    entries.push((key, Box::new(callback)));
                    None
                }
            }
        };
        drop(replaced);
    }

    /// Removes the callback for `key`. Unknown keys are ignored.
    pub fn unregister_object(&self, key: CleanupKey) {
        let removed = {
            let mut entries = self.lock();
            entries
                .iter()
                .position(|(existing, _)| *existing == key)
                .map(|index| entries.remove(index))
        };
        drop(removed);
    }

    pub fn is_registered(&self, key: CleanupKey) -> bool {
        self.lock().iter().any(|(existing, _)| *existing == key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs and forgets every registered callback.
    pub fn cleanup_all(&self) {
        let mut ran = 0usize;
        loop {
            let next = {
                let mut entries = self.lock();
                if entries.is_empty() {
                    None
                } else {
                    Some(entries.remove(0))
                }
            };
            let Some((_, callback)) = next else {
                break;
            };
            callback();
            ran += 1;
        }
        if ran > 0 {
            LOGGER.debug(format!("Cleaned up {ran} registered object(s)"));
        }
    }
}

impl Drop for CleanupNotifier {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

impl fmt::Debug for CleanupNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupNotifier")
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn counter(initial: i32) -> Arc<AtomicI32> {
        Arc::new(AtomicI32::new(initial))
    }

    fn increment(counter: &Arc<AtomicI32>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn decrement(counter: &Arc<AtomicI32>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn value(counter: &Arc<AtomicI32>) -> i32 {
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn callbacks_run_on_drop() {
        let obj = counter(0);
        {
            let cleanup = CleanupNotifier::new();
            cleanup.register_object(CleanupKey::of(&obj), increment(&obj));
            assert_eq!(value(&obj), 0);
        }
        assert_eq!(value(&obj), 1);
    }

    #[test]
    fn manual_cleanup_runs_once() {
        let obj = counter(0);
        {
            let cleanup = CleanupNotifier::new();
            cleanup.register_object(CleanupKey::of(&obj), increment(&obj));
            cleanup.cleanup_all();
            assert_eq!(value(&obj), 1);
            cleanup.cleanup_all();
            assert_eq!(value(&obj), 1);
        }
        assert_eq!(value(&obj), 1);
    }

    #[test]
    fn unregistered_callbacks_do_not_run() {
        let obj = counter(0);
        {
            let cleanup = CleanupNotifier::new();
            cleanup.register_object(CleanupKey::of(&obj), increment(&obj));
            cleanup.unregister_object(CleanupKey::of(&obj));
            assert!(cleanup.is_empty());
        }
        assert_eq!(value(&obj), 0);
    }

    #[test]
    fn multiple_objects_each_get_their_callback() {
        let (obj1, obj2) = (counter(1), counter(2));
        {
            let cleanup = CleanupNotifier::new();
            cleanup.register_object(CleanupKey::of(&obj1), increment(&obj1));
            cleanup.register_object(CleanupKey::of(&obj2), decrement(&obj2));
        }
        assert_eq!(value(&obj1), 2);
        assert_eq!(value(&obj2), 1);
    }

    #[test]
    fn registering_again_replaces_the_callback() {
        let (obj1, obj2) = (counter(1), counter(2));
        {
            let cleanup = CleanupNotifier::new();
            cleanup.register_object(CleanupKey::of(&obj1), increment(&obj1));
            cleanup.register_object(CleanupKey::of(&obj2), increment(&obj2));
            cleanup.register_object(CleanupKey::of(&obj1), decrement(&obj1));
            assert_eq!(value(&obj1), 1);
            assert_eq!(cleanup.len(), 2);
        }
        assert_eq!(value(&obj1), 0);
        assert_eq!(value(&obj2), 3);
    }

    #[test]
    fn unregistering_unknown_key_is_harmless() {
        let obj = counter(0);
        {
            let cleanup = CleanupNotifier::new();
            cleanup.unregister_object(CleanupKey::of(&obj));
        }
        {
            let cleanup = CleanupNotifier::new();
            cleanup.unregister_object(CleanupKey::of(&obj));
            cleanup.register_object(CleanupKey::of(&obj), increment(&obj));
        }
        assert_eq!(value(&obj), 1);
    }

    #[test]
    fn empty_notifier_cleans_up_quietly() {
        let cleanup = CleanupNotifier::new();
        cleanup.cleanup_all();
        drop(cleanup);
    }

    #[test]
    fn several_notifiers_may_reference_one_object() {
        let obj = counter(0);
        {
            let first = CleanupNotifier::new();
            let second = CleanupNotifier::new();
            first.register_object(CleanupKey::of(&obj), increment(&obj));
            second.register_object(CleanupKey::of(&obj), increment(&obj));
        }
        assert_eq!(value(&obj), 2);
    }

    #[test]
    fn callbacks_may_unregister_other_objects() {
        let notifier = Arc::new(CleanupNotifier::new());
        let (first, second) = (CleanupKey::unique(), CleanupKey::unique());
        let obj = counter(0);

        let inner = Arc::downgrade(&notifier);
        notifier.register_object(first, move || {
            if let Some(notifier) = inner.upgrade() {
                notifier.unregister_object(second);
            }
        });
        notifier.register_object(second, increment(&obj));

        notifier.cleanup_all();
        assert_eq!(value(&obj), 0);
        assert!(notifier.is_empty());
    }

    #[test]
    fn unique_keys_differ() {
        assert_ne!(CleanupKey::unique(), CleanupKey::unique());
    }
}
