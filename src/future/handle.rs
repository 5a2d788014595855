use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identifies which asynchronous method of a public class a future belongs to.
///
/// Implemented by the per-class function enums (see `gma::RewardedAdFn`) and by
/// plain `usize` indices. The index must be smaller than the function count the
/// owning [`FutureTable`](super::FutureTable) was created with.
pub trait FunctionId: Copy + fmt::Debug {
    fn index(self) -> usize;
}

impl FunctionId for usize {
    fn index(self) -> usize {
        self
    }
}

/// Untyped ticket for one invocation of an asynchronous operation.
///
/// Handles are scoped to the table that allocated them and their sequence numbers
/// are never reused, so a stale handle can never alias a newer operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureHandle {
    table: u64,
    id: u64,
}

impl FutureHandle {
    /// Never returned by an allocation; default futures carry it.
    pub const INVALID: FutureHandle = FutureHandle { table: 0, id: 0 };

    pub(crate) fn new(table: u64, id: u64) -> Self {
        Self { table, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn table(&self) -> u64 {
        self.table
    }

    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl fmt::Display for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)
    }
}

/// Handle tagged with the result type of the operation.
///
/// Completing a `SafeFutureHandle<i64>` with a `String` does not compile.
pub struct SafeFutureHandle<T> {
    handle: FutureHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SafeFutureHandle<T> {
    pub const INVALID: SafeFutureHandle<T> = SafeFutureHandle {
        handle: FutureHandle::INVALID,
        _marker: PhantomData,
    };

    pub(crate) fn new(handle: FutureHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> FutureHandle {
        self.handle
    }
}

impl<T> Clone for SafeFutureHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SafeFutureHandle<T> {}

impl<T> PartialEq for SafeFutureHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T> Eq for SafeFutureHandle<T> {}

impl<T> Hash for SafeFutureHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T> fmt::Debug for SafeFutureHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SafeFutureHandle").field(&self.handle).finish()
    }
}

impl<T> Default for SafeFutureHandle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> From<SafeFutureHandle<T>> for FutureHandle {
    fn from(handle: SafeFutureHandle<T>) -> Self {
        handle.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_is_default() {
        assert_eq!(FutureHandle::default(), FutureHandle::INVALID);
        assert!(!FutureHandle::INVALID.is_valid());
        assert!(!SafeFutureHandle::<String>::default().get().is_valid());
    }

    #[test]
    fn handles_from_different_tables_differ() {
        let a = FutureHandle::new(1, 7);
        let b = FutureHandle::new(2, 7);
        assert_ne!(a, b);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.to_string(), "1:7");
    }
}
