use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::app::{AppResult, CleanupKey, FirebaseApp};
use crate::future::{FunctionId, Future, FutureResult, FutureStatus, FutureTable};
use crate::gma::backend::PlatformAdBackend;
use crate::gma::error::{
    AdErrorCode, AD_ALREADY_INITIALIZED_ERROR_MESSAGE, AD_LOAD_IN_PROGRESS_ERROR_MESSAGE,
    AD_UNINITIALIZED_ERROR_MESSAGE,
};
use crate::gma::logger::LOGGER;
use crate::gma::types::{AdError, AdRequest, AdResult, UserEarnedRewardListener};

pub(crate) const GMA_ERROR_DOMAIN: &str = "com.google.firebase.gma";

/// Asynchronous methods of [`RewardedAd`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RewardedAdFn {
    Initialize,
    LoadAd,
    Show,
}

impl RewardedAdFn {
    pub const COUNT: usize = 3;
}

impl FunctionId for RewardedAdFn {
    fn index(self) -> usize {
        self as usize
    }
}

struct AdState {
    backend: Option<Arc<dyn PlatformAdBackend>>,
    initialized: bool,
    ad_unit_id: Option<String>,
}

struct RewardedAdInner {
    futures: FutureTable,
    state: Mutex<AdState>,
}

impl RewardedAdInner {
    fn state(&self) -> MutexGuard<'_, AdState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    // Caller holds the state lock.
    fn sync_initialized(&self, state: &mut AdState) -> bool {
        if !state.initialized {
            let last = self.futures.last_result::<()>(RewardedAdFn::Initialize);
            state.initialized = last.status() == FutureStatus::Complete && last.error() == 0;
        }
        state.initialized
    }

    fn init_pending(&self) -> bool {
        self.futures
            .last_result::<()>(RewardedAdFn::Initialize)
            .status()
            == FutureStatus::Pending
    }

    fn load_pending(&self) -> bool {
        self.futures
            .last_result::<AdResult>(RewardedAdFn::LoadAd)
            .status()
            == FutureStatus::Pending
    }

    /// Already completed future that does not replace the function's last result.
    fn fail_fast<T: FutureResult>(&self, code: AdErrorCode, message: &str) -> Future<T> {
        let handle = self.futures.alloc_untracked::<T>();
        let future = self.futures.make_future(handle);
        self.futures.complete(handle, code.code(), message);
        future
    }

    fn fail_fast_load(&self, code: AdErrorCode, message: &str) -> Future<AdResult> {
        let handle = self.futures.alloc_untracked::<AdResult>();
        let future = self.futures.make_future(handle);
        let result = AdResult::failure(AdError::new(code, GMA_ERROR_DOMAIN, message));
        self.futures
            .complete_with_result(handle, code.code(), message, result);
        future
    }

    /// Drops the backend and fails every pending operation.
    fn detach(&self) {
        let backend = self.state().backend.take();
        let invalidated = self.futures.invalidate_all();
        if invalidated > 0 {
            LOGGER.debug(format!("invalidated {invalidated} pending rewarded ad operations"));
        }
        drop(backend);
    }
}

/// Full screen ad that grants the user a reward for watching it.
///
/// Every operation returns a [`Future`] completed by the platform backend.
/// Calls made in the wrong state (before `initialize` succeeded, while a
/// load is still running, or after the owning App was deleted) return a
/// future that is already complete with the matching [`AdErrorCode`].
///
/// A `RewardedAd` should be dropped before its App is deleted. Deleting the App
/// first detaches the ad and fails its pending futures with
/// [`FutureStatus::Invalid`].
pub struct RewardedAd {
    inner: Arc<RewardedAdInner>,
    app: FirebaseApp,
    key: CleanupKey,
}

impl RewardedAd {
    pub fn new(app: &FirebaseApp, backend: Arc<dyn PlatformAdBackend>) -> AppResult<Self> {
        app.check_destroyed()?;

        let inner = Arc::new(RewardedAdInner {
            futures: FutureTable::new(RewardedAdFn::COUNT),
            state: Mutex::new(AdState {
                backend: Some(backend),
                initialized: false,
                ad_unit_id: None,
            }),
        });
        let key = CleanupKey::of(&inner);
        let weak = Arc::downgrade(&inner);
        app.cleanup_notifier().register_object(key, move || {
            if let Some(inner) = weak.upgrade() {
                LOGGER.warn("RewardedAd must be deleted before the App is deleted.");
                inner.detach();
            }
        });

        Ok(Self {
            inner,
            app: app.clone(),
            key,
        })
    }

    pub fn app(&self) -> &FirebaseApp {
        &self.app
    }

    /// True once an `initialize` call completed without error.
    pub fn is_initialized(&self) -> bool {
        let mut state = self.inner.state();
        state.backend.is_some() && self.inner.sync_initialized(&mut state)
    }

    pub fn ad_unit_id(&self) -> Option<String> {
        self.inner.state().ad_unit_id.clone()
    }

    /// Binds the ad to `ad_unit_id`. Must complete before `load_ad` or `show`.
    pub fn initialize(&self, ad_unit_id: &str) -> Future<()> {
        let inner = &self.inner;
        let (backend, future, done) = {
            let mut state = inner.state();
            let Some(backend) = state.backend.clone() else {
                return inner.fail_fast(AdErrorCode::Uninitialized, AD_UNINITIALIZED_ERROR_MESSAGE);
            };
            if inner.sync_initialized(&mut state) || inner.init_pending() {
                return inner.fail_fast(
                    AdErrorCode::AlreadyInitialized,
                    AD_ALREADY_INITIALIZED_ERROR_MESSAGE,
                );
            }
            state.ad_unit_id = Some(ad_unit_id.to_owned());
            let handle = inner.futures.alloc::<()>(RewardedAdFn::Initialize);
            (
                backend,
                inner.futures.make_future(handle),
                inner.futures.callback_data(handle),
            )
        };

        let weak: Weak<RewardedAdInner> = Arc::downgrade(inner);
        future.on_completion(move |completed| {
            if completed.status() != FutureStatus::Complete || completed.error() != 0 {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.state().initialized = true;
            }
        });

        backend.initialize(ad_unit_id, done);
        future
    }

    pub fn initialize_last_result(&self) -> Future<()> {
        self.last_result(RewardedAdFn::Initialize)
    }

    /// Starts loading an ad. Only one load may run at a time.
    pub fn load_ad(&self, request: &AdRequest) -> Future<AdResult> {
        let inner = &self.inner;
        let (backend, future, done) = {
            let mut state = inner.state();
            let backend = match state.backend.clone() {
                Some(backend) if inner.sync_initialized(&mut state) => backend,
                _ => {
                    return inner
                        .fail_fast_load(AdErrorCode::Uninitialized, AD_UNINITIALIZED_ERROR_MESSAGE)
                }
            };
            if inner.load_pending() {
                return inner.fail_fast_load(
                    AdErrorCode::LoadInProgress,
                    AD_LOAD_IN_PROGRESS_ERROR_MESSAGE,
                );
            }
            let handle = inner.futures.alloc::<AdResult>(RewardedAdFn::LoadAd);
            (
                backend,
                inner.futures.make_future(handle),
                inner.futures.callback_data(handle),
            )
        };

        backend.load_ad(request, done);
        future
    }

    pub fn load_ad_last_result(&self) -> Future<AdResult> {
        self.last_result(RewardedAdFn::LoadAd)
    }

    /// Presents the loaded ad. `listener` is told about the reward, if any.
    pub fn show(&self, listener: Option<UserEarnedRewardListener>) -> Future<()> {
        let inner = &self.inner;
        let (backend, future, done) = {
            let mut state = inner.state();
            let backend = match state.backend.clone() {
                Some(backend) if inner.sync_initialized(&mut state) => backend,
                _ => {
                    return inner.fail_fast(AdErrorCode::Uninitialized, AD_UNINITIALIZED_ERROR_MESSAGE)
                }
            };
            let handle = inner.futures.alloc::<()>(RewardedAdFn::Show);
            (
                backend,
                inner.futures.make_future(handle),
                inner.futures.callback_data(handle),
            )
        };

        backend.show(listener, done);
        future
    }

    pub fn show_last_result(&self) -> Future<()> {
        self.last_result(RewardedAdFn::Show)
    }

    fn last_result<T: FutureResult>(&self, function: RewardedAdFn) -> Future<T> {
        if self.inner.state().backend.is_none() {
            return self
                .inner
                .fail_fast(AdErrorCode::Uninitialized, AD_UNINITIALIZED_ERROR_MESSAGE);
        }
        self.inner.futures.last_result(function)
    }
}

impl fmt::Debug for RewardedAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("RewardedAd")
            .field("app", &self.app.name())
            .field("ad_unit_id", &state.ad_unit_id)
            .field("attached", &state.backend.is_some())
            .field("initialized", &state.initialized)
            .finish()
    }
}

impl Drop for RewardedAd {
    fn drop(&mut self) {
        self.app.cleanup_notifier().unregister_object(self.key);
        self.inner.detach();
    }
}
