//! Google Mobile Ads: a rewarded ad built on future tables.
//!
//! [`RewardedAd`] owns a [`FutureTable`](crate::future::FutureTable) with one
//! entry per [`RewardedAdFn`]. The ad network side sits behind
//! [`PlatformAdBackend`]; [`StubAdBackend`] completes every call on a
//! [`Scheduler`](crate::scheduler::Scheduler) thread without a network.
mod backend;
mod error;
mod logger;
mod rewarded_ad;
mod types;

#[doc(inline)]
pub use backend::{PlatformAdBackend, StubAdBackend};

#[doc(inline)]
pub use error::{AdErrorCode, GmaError};

#[doc(inline)]
pub use rewarded_ad::{RewardedAd, RewardedAdFn};

#[doc(inline)]
pub use types::{AdError, AdRequest, AdResult, AdReward, ResponseInfo, UserEarnedRewardListener};
