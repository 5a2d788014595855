use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::future::constants::{
    ERROR_FUTURE_IS_NO_LONGER_VALID, ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID,
};
use crate::future::handle::{FunctionId, FutureHandle, SafeFutureHandle};
use crate::future::logger::LOGGER;
use crate::future::payload::{FutureResult, Payload, PayloadKind};
use crate::future::view::{CompletionCallbackHandle, Future, FutureBase, FutureStatus};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type CompletionCallback = Box<dyn FnOnce(&FutureBase) + Send + 'static>;

struct Slot {
    status: FutureStatus,
    error: i32,
    error_message: String,
    kind: PayloadKind,
    result: Option<Payload>,
    callbacks: Vec<(u64, CompletionCallback)>,
    // Live views plus the last-result entry pointing at this slot.
    references: usize,
}

impl Slot {
    fn pending(kind: PayloadKind, initial: Option<Payload>, references: usize) -> Self {
        Self {
            status: FutureStatus::Pending,
            error: 0,
            error_message: String::new(),
            kind,
            result: initial,
            callbacks: Vec::new(),
            references,
        }
    }
}

struct TableState {
    slots: BTreeMap<u64, Slot>,
    next_handle_id: u64,
    next_callback_id: u64,
    last_results: Vec<Option<u64>>,
    running_callbacks: usize,
}

/// Storage shared by a [`FutureTable`], its views and its completers.
///
/// Only the owning `FutureTable` holds a strong reference; everything else holds a
/// `Weak` and observes `Invalid` once the owner is gone.
pub(crate) struct TableShared {
    id: u64,
    state: Mutex<TableState>,
}

pub(crate) struct SlotSnapshot {
    pub(crate) status: FutureStatus,
    pub(crate) kind: Option<PayloadKind>,
    pub(crate) result: Option<Payload>,
}

impl TableShared {
    fn new(function_count: usize) -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(TableState {
                slots: BTreeMap::new(),
                next_handle_id: 1,
                next_callback_id: 1,
                last_results: vec![None; function_count],
                running_callbacks: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn owns(&self, handle: FutureHandle) -> bool {
        handle.is_valid() && handle.table() == self.id
    }

    fn slot<'a>(&self, state: &'a TableState, handle: FutureHandle) -> Option<&'a Slot> {
        if !self.owns(handle) {
            return None;
        }
        state.slots.get(&handle.id())
    }

    fn slot_mut<'a>(&self, state: &'a mut TableState, handle: FutureHandle) -> Option<&'a mut Slot> {
        if !self.owns(handle) {
            return None;
        }
        state.slots.get_mut(&handle.id())
    }

    fn check_function(state: &TableState, index: usize) {
        assert!(
            index < state.last_results.len(),
            "function id {index} is out of range for a future table with {} functions",
            state.last_results.len()
        );
    }

    /// Drops one reference and unlinks the slot once nothing can observe it any more.
    /// The removed slot is returned so the caller can drop it after unlocking.
    fn release_locked(state: &mut TableState, id: u64) -> Option<Slot> {
        let slot = state.slots.get_mut(&id)?;
        slot.references = slot.references.saturating_sub(1);
        Self::prune_locked(state, id)
    }

    fn prune_locked(state: &mut TableState, id: u64) -> Option<Slot> {
        let slot = state.slots.get(&id)?;
        if slot.references == 0 && slot.status != FutureStatus::Pending {
            log::trace!("future slot {id} released");
            return state.slots.remove(&id);
        }
        None
    }

    fn alloc(
        self: &Arc<Self>,
        function: Option<usize>,
        kind: PayloadKind,
        initial: Option<Payload>,
    ) -> FutureHandle {
        let (handle, replaced) = {
            let mut state = self.lock();
            if let Some(index) = function {
                Self::check_function(&state, index);
            }
            let id = state.next_handle_id;
            state.next_handle_id += 1;
            let references = usize::from(function.is_some());
            state.slots.insert(id, Slot::pending(kind, initial, references));

            let previous = function.and_then(|index| state.last_results[index].replace(id));
            let replaced = previous.and_then(|old| Self::release_locked(&mut state, old));
            (FutureHandle::new(self.id, id), replaced)
        };
        drop(replaced);
        log::trace!("future table {}: allocated handle {handle} (fn {function:?})", self.id);
        handle
    }

    fn complete<F>(
        self: &Arc<Self>,
        handle: FutureHandle,
        kind: PayloadKind,
        error: i32,
        error_message: &str,
        populate: F,
    ) where
        F: FnOnce(&mut Option<Payload>),
    {
        let callbacks = {
            let mut state = self.lock();
            let Some(slot) = self.slot_mut(&mut state, handle) else {
                log::trace!("future table {}: completion of released handle {handle} ignored", self.id);
                return;
            };
            if slot.status != FutureStatus::Pending {
                LOGGER.debug(format!(
                    "Ignoring completion of future {handle}: it is already {:?}",
                    slot.status
                ));
                return;
            }
            assert!(
                slot.kind == kind,
                "future {handle} holds {:?} results but was completed with {kind:?}",
                slot.kind
            );
            slot.error = error;
            slot.error_message = error_message.to_owned();
            populate(&mut slot.result);
            slot.status = FutureStatus::Complete;
            let callbacks = std::mem::take(&mut slot.callbacks);
            state.running_callbacks += 1;
            callbacks
        };
        log::trace!("future table {}: completed handle {handle} with error {error}", self.id);
        self.run_callbacks(handle, callbacks);
    }

    /// Runs callbacks with the lock released. `running_callbacks` must already
    /// account for this run.
    fn run_callbacks(self: &Arc<Self>, handle: FutureHandle, callbacks: Vec<(u64, CompletionCallback)>) {
        let _guard = RunningCallbacks {
            shared: self,
            handle,
        };
        if callbacks.is_empty() {
            return;
        }
        let future = FutureBase::attach(self, handle);
        for (_, callback) in callbacks {
            callback(&future);
        }
    }

    pub(crate) fn reference(&self, handle: FutureHandle) -> bool {
        let mut state = self.lock();
        match self.slot_mut(&mut state, handle) {
            Some(slot) => {
                slot.references += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release(&self, handle: FutureHandle) {
        if !self.owns(handle) {
            return;
        }
        let removed = {
            let mut state = self.lock();
            Self::release_locked(&mut state, handle.id())
        };
        drop(removed);
    }

    pub(crate) fn status(&self, handle: FutureHandle) -> FutureStatus {
        let state = self.lock();
        self.slot(&state, handle)
            .map(|slot| slot.status)
            .unwrap_or(FutureStatus::Invalid)
    }

    pub(crate) fn error(&self, handle: FutureHandle) -> i32 {
        let state = self.lock();
        match self.slot(&state, handle) {
            Some(slot) if slot.status != FutureStatus::Invalid => slot.error,
            _ => ERROR_FUTURE_IS_NO_LONGER_VALID,
        }
    }

    pub(crate) fn error_message(&self, handle: FutureHandle) -> String {
        let state = self.lock();
        match self.slot(&state, handle) {
            Some(slot) if slot.status != FutureStatus::Invalid => slot.error_message.clone(),
            _ => ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID.to_owned(),
        }
    }

    pub(crate) fn snapshot(&self, handle: FutureHandle) -> SlotSnapshot {
        let state = self.lock();
        match self.slot(&state, handle) {
            Some(slot) => SlotSnapshot {
                status: slot.status,
                kind: Some(slot.kind),
                result: slot.result.clone(),
            },
            None => SlotSnapshot {
                status: FutureStatus::Invalid,
                kind: None,
                result: None,
            },
        }
    }

    pub(crate) fn add_callback(
        self: &Arc<Self>,
        handle: FutureHandle,
        callback: CompletionCallback,
    ) -> CompletionCallbackHandle {
        {
            let mut state = self.lock();
            let callback_id = state.next_callback_id;
            if let Some(slot) = self.slot_mut(&mut state, handle) {
                if slot.status == FutureStatus::Pending {
                    slot.callbacks.push((callback_id, callback));
                    state.next_callback_id += 1;
                    return CompletionCallbackHandle::new(handle, callback_id);
                }
            }
            state.running_callbacks += 1;
        }
        // Already terminal (or released): run right away on the calling thread.
        self.run_callbacks(handle, vec![(0, callback)]);
        CompletionCallbackHandle::default()
    }

    pub(crate) fn remove_callback(&self, handle: CompletionCallbackHandle) {
        let removed = {
            let mut state = self.lock();
            match self.slot_mut(&mut state, handle.future()) {
                Some(slot) => {
                    let position = slot
                        .callbacks
                        .iter()
                        .position(|(id, _)| *id == handle.id());
                    position.map(|index| slot.callbacks.remove(index))
                }
                None => None,
            }
        };
        drop(removed);
    }

    fn last_result(self: &Arc<Self>, index: usize) -> FutureBase {
        let handle = {
            let mut state = self.lock();
            Self::check_function(&state, index);
            let Some(id) = state.last_results[index] else {
                return FutureBase::invalid();
            };
            let slot = state.slots.get_mut(&id);
            match slot {
                Some(slot) => {
                    slot.references += 1;
                    FutureHandle::new(self.id, id)
                }
                None => return FutureBase::invalid(),
            }
        };
        FutureBase::from_parts(Arc::downgrade(self), handle, true)
    }

    fn invalidate_last_result(&self, index: usize) {
        let removed = {
            let mut state = self.lock();
            Self::check_function(&state, index);
            state.last_results[index]
                .take()
                .and_then(|id| Self::release_locked(&mut state, id))
        };
        drop(removed);
    }

    fn invalidate_all(self: &Arc<Self>) -> usize {
        let invalidated: Vec<(FutureHandle, Vec<(u64, CompletionCallback)>)> = {
            let mut state = self.lock();
            let table = self.id;
            let mut invalidated = Vec::new();
            for (id, slot) in state.slots.iter_mut() {
                if slot.status == FutureStatus::Pending {
                    slot.status = FutureStatus::Invalid;
                    slot.error = ERROR_FUTURE_IS_NO_LONGER_VALID;
                    slot.error_message = ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID.to_owned();
                    invalidated.push((
                        FutureHandle::new(table, *id),
                        std::mem::take(&mut slot.callbacks),
                    ));
                }
            }
            state.running_callbacks += invalidated.len();
            invalidated
        };
        let count = invalidated.len();
        for (handle, callbacks) in invalidated {
            self.run_callbacks(handle, callbacks);
        }
        count
    }

    fn teardown(self: &Arc<Self>) {
        let invalidated = self.invalidate_all();
        if invalidated > 0 {
            LOGGER.debug(format!(
                "Future table {} destroyed with {invalidated} pending future(s); they were invalidated",
                self.id
            ));
        }
        let slots = {
            let mut state = self.lock();
            state.last_results.iter_mut().for_each(|entry| *entry = None);
            std::mem::take(&mut state.slots)
        };
        drop(slots);
    }

    fn valid(&self, handle: FutureHandle) -> bool {
        let state = self.lock();
        self.slot(&state, handle).is_some()
    }

    fn is_safe_to_delete(&self) -> bool {
        let state = self.lock();
        state.running_callbacks == 0
            && state
                .slots
                .values()
                .all(|slot| slot.status != FutureStatus::Pending)
    }

    fn is_referenced_externally(&self) -> bool {
        let state = self.lock();
        let total: usize = state.slots.values().map(|slot| slot.references).sum();
        let internal = state
            .last_results
            .iter()
            .flatten()
            .filter(|id| state.slots.contains_key(*id))
            .count();
        total > internal
    }
}

struct RunningCallbacks<'a> {
    shared: &'a Arc<TableShared>,
    handle: FutureHandle,
}

impl Drop for RunningCallbacks<'_> {
    fn drop(&mut self) {
        let removed = {
            let mut state = self.shared.lock();
            state.running_callbacks = state.running_callbacks.saturating_sub(1);
            if self.shared.owns(self.handle) {
                TableShared::prune_locked(&mut state, self.handle.id())
            } else {
                None
            }
        };
        drop(removed);
    }
}

/// Registry of asynchronous operation outcomes owned by one API object.
///
/// A table is created with the number of function ids of its owner. Each
/// allocation creates a pending slot and becomes the "last result" of its
/// function id. Completion may happen on any thread; completion callbacks run
/// on the completing thread with no internal lock held, so they may call back
/// into the table. The `populate` closure of [`complete_with`](Self::complete_with)
/// is the exception: it runs under the lock and must not touch the table.
///
/// Dropping the table invalidates every pending operation: their callbacks fire
/// with status [`FutureStatus::Invalid`] and all outstanding views report
/// `Invalid` from then on.
pub struct FutureTable {
    shared: Arc<TableShared>,
}

impl FutureTable {
    pub fn new(function_count: usize) -> Self {
        Self {
            shared: Arc::new(TableShared::new(function_count)),
        }
    }

    pub fn function_count(&self) -> usize {
        self.shared.lock().last_results.len()
    }

    /// Allocates a pending operation for `function`, replacing its last result.
    pub fn alloc<T: FutureResult>(&self, function: impl FunctionId) -> SafeFutureHandle<T> {
        SafeFutureHandle::new(self.shared.alloc(Some(function.index()), T::kind(), None))
    }

    /// Like [`alloc`](Self::alloc) with result data preset to `initial`.
    pub fn alloc_with<T: FutureResult>(&self, function: impl FunctionId, initial: T) -> SafeFutureHandle<T> {
        SafeFutureHandle::new(self.shared.alloc(
            Some(function.index()),
            T::kind(),
            Some(initial.into_payload()),
        ))
    }

    /// Allocates an operation that is not recorded as any function's last result.
    ///
    /// Nothing keeps the slot alive after completion unless a view exists, so
    /// create the future with [`make_future`](Self::make_future) before completing.
    pub fn alloc_untracked<T: FutureResult>(&self) -> SafeFutureHandle<T> {
        SafeFutureHandle::new(self.shared.alloc(None, T::kind(), None))
    }

    pub fn complete<T: FutureResult>(&self, handle: SafeFutureHandle<T>, error: i32, error_message: &str) {
        self.shared
            .complete(handle.get(), T::kind(), error, error_message, |_| {});
    }

    pub fn complete_with_result<T: FutureResult>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        error_message: &str,
        result: T,
    ) {
        self.shared
            .complete(handle.get(), T::kind(), error, error_message, move |slot| {
                *slot = Some(result.into_payload());
            });
    }

    /// Completes the operation after letting `populate` edit the current result
    /// (the initial data, or `T::default()` when there is none).
    pub fn complete_with<T, F>(&self, handle: SafeFutureHandle<T>, error: i32, error_message: &str, populate: F)
    where
        T: FutureResult + Default,
        F: FnOnce(&mut T),
    {
        self.shared
            .complete(handle.get(), T::kind(), error, error_message, move |slot| {
                let mut value = slot
                    .as_ref()
                    .and_then(T::from_payload)
                    .unwrap_or_default();
                populate(&mut value);
                *slot = Some(value.into_payload());
            });
    }

    pub fn make_future<T: FutureResult>(&self, handle: SafeFutureHandle<T>) -> Future<T> {
        Future::from_base(FutureBase::attach(&self.shared, handle.get()))
    }

    /// Returns the most recent operation for `function`, or an invalid future.
    pub fn last_result<T: FutureResult>(&self, function: impl FunctionId) -> Future<T> {
        Future::from_base(self.shared.last_result(function.index()))
    }

    /// Makes [`last_result`](Self::last_result) report `Invalid` for `function`.
    pub fn invalidate_last_result(&self, function: impl FunctionId) {
        self.shared.invalidate_last_result(function.index());
    }

    /// Forces every pending operation to `Invalid` and fires its callbacks.
    /// Returns the number of operations invalidated.
    pub fn invalidate_all(&self) -> usize {
        self.shared.invalidate_all()
    }

    /// True while the slot behind `handle` is still tracked by this table.
    pub fn valid_future<T>(&self, handle: SafeFutureHandle<T>) -> bool {
        self.shared.valid(handle.get())
    }

    /// True when no operation is pending and no completion callback is running.
    pub fn is_safe_to_delete(&self) -> bool {
        self.shared.is_safe_to_delete()
    }

    /// True when some future view other than the last-result entries is alive.
    pub fn is_referenced_externally(&self) -> bool {
        self.shared.is_referenced_externally()
    }

    /// Weak completion capability for platform glue running on other threads.
    pub fn completer(&self) -> FutureCompleter {
        FutureCompleter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn callback_data<T: FutureResult>(&self, handle: SafeFutureHandle<T>) -> FutureCallbackData<T> {
        FutureCallbackData {
            completer: self.completer(),
            handle,
        }
    }
}

impl fmt::Debug for FutureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureTable")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

impl Drop for FutureTable {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

/// Borrowed completion access to a [`FutureTable`].
///
/// Completing through a completer whose table has been dropped does nothing.
#[derive(Clone)]
pub struct FutureCompleter {
    shared: Weak<TableShared>,
}

impl FutureCompleter {
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn complete<T: FutureResult>(&self, handle: SafeFutureHandle<T>, error: i32, error_message: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.complete(handle.get(), T::kind(), error, error_message, |_| {});
        } else {
            log::trace!("completion of {} dropped: future table is gone", handle.get());
        }
    }

    pub fn complete_with_result<T: FutureResult>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        error_message: &str,
        result: T,
    ) {
        if let Some(shared) = self.shared.upgrade() {
            shared.complete(handle.get(), T::kind(), error, error_message, move |slot| {
                *slot = Some(result.into_payload());
            });
        } else {
            log::trace!("completion of {} dropped: future table is gone", handle.get());
        }
    }
}

impl fmt::Debug for FutureCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureCompleter")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Everything a platform backend needs to finish one operation.
pub struct FutureCallbackData<T> {
    completer: FutureCompleter,
    handle: SafeFutureHandle<T>,
}

impl<T: FutureResult> FutureCallbackData<T> {
    pub fn handle(&self) -> SafeFutureHandle<T> {
        self.handle
    }

    pub fn complete(self, error: i32, error_message: &str) {
        self.completer.complete(self.handle, error, error_message);
    }

    pub fn complete_with_result(self, error: i32, error_message: &str, result: T) {
        self.completer
            .complete_with_result(self.handle, error, error_message, result);
    }
}

impl<T> Clone for FutureCallbackData<T> {
    fn clone(&self) -> Self {
        Self {
            completer: self.completer.clone(),
            handle: self.handle,
        }
    }
}

impl<T> fmt::Debug for FutureCallbackData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureCallbackData")
            .field("handle", &self.handle)
            .field("completer", &self.completer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Semaphore;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    const FN_LOAD: usize = 0;
    const FN_SHOW: usize = 1;
    const FN_COUNT: usize = 2;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn alloc_starts_pending_and_complete_sets_fields() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        let future = table.make_future(handle);
        assert_eq!(future.status(), FutureStatus::Pending);

        table.complete(handle, 3, "load failed");
        assert_eq!(future.status(), FutureStatus::Complete);
        assert_eq!(future.error(), 3);
        assert_eq!(future.error_message(), "load failed");
    }

    #[test]
    fn complete_with_result_is_readable() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<String>(FN_LOAD);
        table.complete_with_result(handle, 0, "", "token".to_string());
        let future = table.last_result::<String>(FN_LOAD);
        assert_eq!(future.result().as_deref(), Some("token"));
    }

    #[test]
    fn complete_with_populates_initial_data() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc_with::<i64>(FN_LOAD, 40);
        table.complete_with(handle, 0, "", |value: &mut i64| *value += 2);
        assert_eq!(table.last_result::<i64>(FN_LOAD).result(), Some(42));
    }

    #[test]
    fn completing_twice_runs_callbacks_once() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        let (count, seen) = counter();
        table.make_future(handle).on_completion(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        table.complete(handle, 0, "");
        table.complete(handle, 7, "late");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let future = table.make_future(handle);
        assert_eq!(future.error(), 0);
        assert!(future.error_message().is_empty());
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        let future = table.make_future(handle);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            future.on_completion(move |_| order.lock().unwrap().push(i));
        }
        table.complete(handle, 0, "");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn callback_on_completed_future_runs_immediately() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        table.complete(handle, 0, "");
        let (count, seen) = counter();
        let registration = table.last_result::<()>(FN_LOAD).on_completion(move |future| {
            assert_eq!(future.status(), FutureStatus::Complete);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!registration.is_valid());
    }

    #[test]
    fn removed_callback_does_not_run() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        let future = table.make_future(handle);
        let (count, seen) = counter();
        let registration = future.on_completion(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(registration.is_valid());
        future.remove_on_completion(registration);
        table.complete(handle, 0, "");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn last_result_equality_follows_allocations() {
        let table = FutureTable::new(FN_COUNT);
        assert_eq!(table.last_result::<()>(FN_LOAD).status(), FutureStatus::Invalid);

        table.alloc::<()>(FN_LOAD);
        let first = table.last_result::<()>(FN_LOAD);
        assert_eq!(first, table.last_result::<()>(FN_LOAD));

        table.alloc::<()>(FN_LOAD);
        assert_ne!(first, table.last_result::<()>(FN_LOAD));
        assert_eq!(table.last_result::<()>(FN_SHOW).status(), FutureStatus::Invalid);
    }

    #[test]
    fn previous_invocation_keeps_its_outcome() {
        let table = FutureTable::new(FN_COUNT);
        let first_handle = table.alloc::<i64>(FN_LOAD);
        let first = table.make_future(first_handle);
        table.complete_with_result(first_handle, 0, "", 1);

        let second_handle = table.alloc::<i64>(FN_LOAD);
        table.complete_with_result(second_handle, 5, "second failed", 2);

        assert_eq!(first.result(), Some(1));
        assert_eq!(first.error(), 0);
        assert_eq!(table.last_result::<i64>(FN_LOAD).result(), Some(2));
        assert_eq!(table.last_result::<i64>(FN_LOAD).error(), 5);
    }

    #[test]
    fn dropping_table_invalidates_pending_futures() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        let future = table.make_future(handle);
        let completer = table.completer();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        future.on_completion(move |f| {
            sink.lock().unwrap().push((f.status(), f.error()));
        });

        drop(table);

        assert_eq!(
            *observed.lock().unwrap(),
            vec![(FutureStatus::Invalid, ERROR_FUTURE_IS_NO_LONGER_VALID)]
        );
        assert_eq!(future.status(), FutureStatus::Invalid);
        assert_eq!(future.error_message(), ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID);

        assert!(!completer.is_attached());
        completer.complete(handle, 0, "");
        assert_eq!(observed.lock().unwrap().len(), 1);
    }

    #[test]
    fn invalidate_all_leaves_completed_futures_alone() {
        let table = FutureTable::new(FN_COUNT);
        let done = table.alloc::<()>(FN_LOAD);
        table.complete(done, 0, "");
        let pending = table.alloc::<()>(FN_SHOW);
        let pending_future = table.make_future(pending);

        assert_eq!(table.invalidate_all(), 1);
        assert_eq!(table.last_result::<()>(FN_LOAD).status(), FutureStatus::Complete);
        assert_eq!(pending_future.status(), FutureStatus::Invalid);

        table.complete(pending, 0, "");
        assert_eq!(pending_future.status(), FutureStatus::Invalid);
    }

    #[test]
    fn untracked_slots_are_released_with_their_last_view() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc_untracked::<()>();
        let future = table.make_future(handle);
        table.complete(handle, 0, "");
        assert!(table.valid_future(handle));
        drop(future);
        assert!(!table.valid_future(handle));
        assert_eq!(table.make_future(handle).status(), FutureStatus::Invalid);
    }

    #[test]
    fn pending_untracked_slot_survives_without_views() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc_untracked::<()>();
        assert!(table.valid_future(handle));
        assert!(!table.is_safe_to_delete());
        table.complete(handle, 0, "");
        assert!(!table.valid_future(handle));
        assert!(table.is_safe_to_delete());
    }

    #[test]
    fn invalidate_last_result_forgets_the_function() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        table.complete(handle, 0, "");
        table.invalidate_last_result(FN_LOAD);
        assert_eq!(table.last_result::<()>(FN_LOAD).status(), FutureStatus::Invalid);
    }

    #[test]
    fn external_references_are_detected() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<()>(FN_LOAD);
        assert!(!table.is_referenced_externally());
        let future = table.make_future(handle);
        assert!(table.is_referenced_externally());
        drop(future);
        assert!(!table.is_referenced_externally());
    }

    #[test]
    fn handles_from_other_tables_are_invalid() {
        let table = FutureTable::new(FN_COUNT);
        let other = FutureTable::new(FN_COUNT);
        let foreign = other.alloc::<()>(FN_LOAD);
        assert!(!table.valid_future(foreign));
        table.complete(foreign, 0, "");
        assert_eq!(other.make_future(foreign).status(), FutureStatus::Pending);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_function_id_panics() {
        let table = FutureTable::new(FN_COUNT);
        table.alloc::<()>(FN_COUNT);
    }

    #[test]
    #[should_panic(expected = "before it completed")]
    fn reading_pending_result_panics() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<i64>(FN_LOAD);
        table.make_future(handle).result();
    }

    #[test]
    #[should_panic(expected = "holds")]
    fn reading_wrong_result_type_panics() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<i64>(FN_LOAD);
        table.complete_with_result(handle, 0, "", 3);
        table.last_result::<String>(FN_LOAD).result();
    }

    #[test]
    fn callback_may_allocate_on_the_same_table() {
        let table = Arc::new(FutureTable::new(FN_COUNT));
        let handle = table.alloc::<()>(FN_LOAD);
        let inner = table.clone();
        table.make_future(handle).on_completion(move |_| {
            let next = inner.alloc::<()>(FN_SHOW);
            inner.complete(next, 0, "");
        });
        table.complete(handle, 0, "");
        assert_eq!(table.last_result::<()>(FN_SHOW).status(), FutureStatus::Complete);
    }

    #[test]
    fn completion_from_another_thread_is_visible() {
        let table = FutureTable::new(FN_COUNT);
        let handle = table.alloc::<String>(FN_LOAD);
        let future = table.make_future(handle);
        let signal = Arc::new(Semaphore::new(0));
        let post = signal.clone();
        future.on_completion(move |_| post.post());

        let data = table.callback_data(handle);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            data.complete_with_result(0, "", "done".to_string());
        });

        assert!(signal.timed_wait(Duration::from_secs(1)));
        assert_eq!(future.status(), FutureStatus::Complete);
        assert_eq!(future.error(), 0);
        assert_eq!(future.result().as_deref(), Some("done"));
        worker.join().unwrap();
    }

    #[test]
    fn concurrent_allocations_and_completions() {
        let table = Arc::new(FutureTable::new(FN_COUNT));
        let completed = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let completed = completed.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let handle = table.alloc::<i64>(FN_LOAD);
                        let future = table.make_future(handle);
                        let completed = completed.clone();
                        future.on_completion(move |_| {
                            completed.fetch_add(1, Ordering::SeqCst);
                        });
                        table.complete_with_result(handle, 0, "", i);
                        assert_eq!(future.result(), Some(i));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 8 * 200);
        assert!(table.is_safe_to_delete());
    }
}
