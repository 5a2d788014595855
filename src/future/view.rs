use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::future::constants::{
    ERROR_FUTURE_IS_NO_LONGER_VALID, ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID,
};
use crate::future::handle::FutureHandle;
use crate::future::payload::FutureResult;
use crate::future::table::TableShared;

/// Lifecycle of an asynchronous operation as seen through a future.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FutureStatus {
    /// Finished; `error()` and `result()` are meaningful.
    Complete,
    Pending,
    /// Never set up, released, or discarded by its owner before finishing.
    Invalid,
}

/// Token returned by `on_completion`, used to unregister the callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompletionCallbackHandle {
    future: FutureHandle,
    id: u64,
}

impl CompletionCallbackHandle {
    pub(crate) fn new(future: FutureHandle, id: u64) -> Self {
        Self { future, id }
    }

    pub(crate) fn future(&self) -> FutureHandle {
        self.future
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// False when the callback already ran at registration time.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

/// Untyped view of one operation in a [`FutureTable`](super::FutureTable).
///
/// Views are cheap to clone and can be read from any thread. Every live view
/// keeps its slot readable; a view outliving its table reports
/// [`FutureStatus::Invalid`].
pub struct FutureBase {
    table: Weak<TableShared>,
    handle: FutureHandle,
    // Whether this view holds a reference on its slot.
    counted: bool,
}

impl FutureBase {
    /// A view attached to nothing. Its status is always `Invalid`.
    pub fn invalid() -> Self {
        Self {
            table: Weak::new(),
            handle: FutureHandle::INVALID,
            counted: false,
        }
    }

    pub(crate) fn attach(shared: &Arc<TableShared>, handle: FutureHandle) -> Self {
        let counted = shared.reference(handle);
        Self::from_parts(Arc::downgrade(shared), handle, counted)
    }

    pub(crate) fn from_parts(table: Weak<TableShared>, handle: FutureHandle, counted: bool) -> Self {
        Self {
            table,
            handle,
            counted,
        }
    }

    pub fn handle(&self) -> FutureHandle {
        self.handle
    }

    pub fn status(&self) -> FutureStatus {
        match self.table.upgrade() {
            Some(shared) => shared.status(self.handle),
            None => FutureStatus::Invalid,
        }
    }

    /// Error code of a completed operation; `0` conventionally means success.
    pub fn error(&self) -> i32 {
        match self.table.upgrade() {
            Some(shared) => shared.error(self.handle),
            None => ERROR_FUTURE_IS_NO_LONGER_VALID,
        }
    }

    pub fn error_message(&self) -> String {
        match self.table.upgrade() {
            Some(shared) => shared.error_message(self.handle),
            None => ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID.to_owned(),
        }
    }

    /// Registers `callback` to run once the operation leaves `Pending`.
    ///
    /// The callback runs on whichever thread completes or invalidates the
    /// operation. If that already happened it runs immediately on the calling
    /// thread and the returned handle is not valid.
    pub fn on_completion<F>(&self, callback: F) -> CompletionCallbackHandle
    where
        F: FnOnce(&FutureBase) + Send + 'static,
    {
        match self.table.upgrade() {
            Some(shared) => shared.add_callback(self.handle, Box::new(callback)),
            None => {
                callback(self);
                CompletionCallbackHandle::default()
            }
        }
    }

    pub fn remove_on_completion(&self, registration: CompletionCallbackHandle) {
        if !registration.is_valid() || registration.future() != self.handle {
            return;
        }
        if let Some(shared) = self.table.upgrade() {
            shared.remove_callback(registration);
        }
    }

    /// Detaches this view; it reports `Invalid` afterwards.
    pub fn release(&mut self) {
        self.detach();
        self.table = Weak::new();
        self.handle = FutureHandle::INVALID;
    }

    fn detach(&mut self) {
        if !self.counted {
            return;
        }
        self.counted = false;
        if let Some(shared) = self.table.upgrade() {
            shared.release(self.handle);
        }
    }
}

impl Clone for FutureBase {
    fn clone(&self) -> Self {
        let counted = self.counted
            && self
                .table
                .upgrade()
                .map(|shared| shared.reference(self.handle))
                .unwrap_or(false);
        Self {
            table: self.table.clone(),
            handle: self.handle,
            counted,
        }
    }
}

impl Drop for FutureBase {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Default for FutureBase {
    fn default() -> Self {
        Self::invalid()
    }
}

impl PartialEq for FutureBase {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for FutureBase {}

impl fmt::Debug for FutureBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureBase")
            .field("handle", &self.handle)
            .field("status", &self.status())
            .finish()
    }
}

/// Typed view of an operation producing a `T`.
pub struct Future<T> {
    base: FutureBase,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FutureResult> Future<T> {
    pub fn invalid() -> Self {
        Self::from_base(FutureBase::invalid())
    }

    pub(crate) fn from_base(base: FutureBase) -> Self {
        Self {
            base,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> FutureHandle {
        self.base.handle()
    }

    pub fn status(&self) -> FutureStatus {
        self.base.status()
    }

    pub fn error(&self) -> i32 {
        self.base.error()
    }

    pub fn error_message(&self) -> String {
        self.base.error_message()
    }

    /// Result of a completed operation.
    ///
    /// Returns `None` for invalid futures and for operations completed without
    /// result data.
    ///
    /// # Panics
    ///
    /// Panics when the operation is still pending, or when it produces a type
    /// other than `T`.
    pub fn result(&self) -> Option<T> {
        let shared = self.base.table.upgrade()?;
        let snapshot = shared.snapshot(self.base.handle);
        match snapshot.status {
            FutureStatus::Invalid => None,
            FutureStatus::Pending => panic!(
                "result() read from future {} before it completed",
                self.base.handle
            ),
            FutureStatus::Complete => {
                if let Some(kind) = snapshot.kind {
                    assert!(
                        kind == T::kind(),
                        "future {} holds {kind:?} results, not {:?}",
                        self.base.handle,
                        T::kind()
                    );
                }
                snapshot.result.map(|payload| {
                    T::from_payload(&payload).unwrap_or_else(|| {
                        panic!(
                            "future {} holds a payload that does not decode as {:?}",
                            self.base.handle,
                            T::kind()
                        )
                    })
                })
            }
        }
    }

    pub fn on_completion<F>(&self, callback: F) -> CompletionCallbackHandle
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        self.base
            .on_completion(move |base| callback(&Future::from_base(base.clone())))
    }

    pub fn remove_on_completion(&self, registration: CompletionCallbackHandle) {
        self.base.remove_on_completion(registration);
    }

    pub fn release(&mut self) {
        self.base.release();
    }

    pub fn base(&self) -> &FutureBase {
        &self.base
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: FutureResult> Default for Future<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<T> Eq for Future<T> {}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Future").field(&self.base).finish()
    }
}

impl<T> From<Future<T>> for FutureBase {
    fn from(future: Future<T>) -> Self {
        future.base
    }
}
