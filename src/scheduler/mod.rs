//! Delayed and repeating callbacks on a single worker thread.
mod logger;
mod request;
mod worker;

#[doc(inline)]
pub use request::RequestHandle;

#[doc(inline)]
pub use worker::{ScheduleTimeMs, Scheduler};
