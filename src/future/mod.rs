//! Future tables: bookkeeping for asynchronous operations.
//!
//! A public class that exposes asynchronous methods owns one [`FutureTable`].
//! Each call allocates a pending slot and hands the caller a [`Future`] view;
//! platform glue later completes the slot through a [`SafeFutureHandle`] or a
//! [`FutureCompleter`], possibly from another thread. The table remembers the
//! most recent call of every method so `*_last_result` accessors can return it.
mod constants;
mod handle;
mod logger;
mod payload;
mod table;
mod view;

#[doc(inline)]
pub use constants::{ERROR_FUTURE_IS_NO_LONGER_VALID, ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID};

#[doc(inline)]
pub use handle::{FunctionId, FutureHandle, SafeFutureHandle};

#[doc(inline)]
pub use payload::{FutureResult, Payload, PayloadKind};

#[doc(inline)]
pub use table::{FutureCallbackData, FutureCompleter, FutureTable};

#[doc(inline)]
pub use view::{CompletionCallbackHandle, Future, FutureBase, FutureStatus};
