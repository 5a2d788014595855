//! Asynchronous core of the Firebase native SDK.
//!
//! Every public class with asynchronous methods owns a [`future::FutureTable`].
//! Calls hand back [`future::Future`] views that platform glue completes later,
//! often from another thread. The [`scheduler::Scheduler`] runs delayed and
//! repeating work on a single worker thread, and each [`app::FirebaseApp`]
//! carries a [`app::CleanupNotifier`] that detaches the objects created for it
//! when the App is deleted. [`gma::RewardedAd`] is a complete consumer of all
//! three.
//!
//! ```
//! use firebase_native_sdk::future::{FutureStatus, FutureTable};
//!
//! let table = FutureTable::new(1);
//! let handle = table.alloc::<i64>(0usize);
//! let future = table.make_future(handle);
//! assert_eq!(future.status(), FutureStatus::Pending);
//!
//! table.complete_with_result(handle, 0, "", 42);
//! assert_eq!(future.result(), Some(42));
//! ```

pub mod app;
pub mod future;
pub mod gma;
pub mod logger;
pub mod scheduler;

#[cfg(test)]
pub mod test_support;
