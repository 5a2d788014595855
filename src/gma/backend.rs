use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::future::FutureCallbackData;
use crate::gma::error::{AdErrorCode, AD_COULD_NOT_PARSE_AD_REQUEST_ERROR_MESSAGE};
use crate::gma::types::{AdError, AdRequest, AdResult, AdReward, ResponseInfo, UserEarnedRewardListener};
use crate::scheduler::{ScheduleTimeMs, Scheduler};

/// Platform side of an ad object.
///
/// Each call receives the completion data for its future and must complete it
/// exactly once, from any thread, now or later.
pub trait PlatformAdBackend: Send + Sync {
    fn initialize(&self, ad_unit_id: &str, done: FutureCallbackData<()>);

    fn load_ad(&self, request: &AdRequest, done: FutureCallbackData<AdResult>);

    fn show(&self, listener: Option<UserEarnedRewardListener>, done: FutureCallbackData<()>);
}

#[derive(Clone, Debug)]
struct StubConfig {
    latency: ScheduleTimeMs,
    load_error: Option<AdError>,
    reward: AdReward,
}

/// Backend without an ad network behind it.
///
/// Every operation succeeds after a fixed latency, completing its future on
/// the backend's scheduler thread. Loads can be configured to fail.
pub struct StubAdBackend {
    scheduler: Scheduler,
    config: Mutex<StubConfig>,
}

pub(crate) const STUB_ERROR_DOMAIN: &str = "com.google.firebase.gma.stub";

impl StubAdBackend {
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    pub fn with_latency(latency: ScheduleTimeMs) -> Self {
        Self {
            scheduler: Scheduler::new(),
            config: Mutex::new(StubConfig {
                latency,
                load_error: None,
                reward: AdReward::new("coins", 10),
            }),
        }
    }

    fn config(&self) -> MutexGuard<'_, StubConfig> {
        self.config.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Makes subsequent loads fail with `code`.
    pub fn fail_loads_with(&self, code: AdErrorCode, message: impl Into<String>) {
        self.config().load_error = Some(AdError::new(code, STUB_ERROR_DOMAIN, message));
    }

    pub fn succeed_loads(&self) {
        self.config().load_error = None;
    }

    pub fn set_reward(&self, reward: AdReward) {
        self.config().reward = reward;
    }
}

impl Default for StubAdBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StubAdBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubAdBackend")
            .field("config", &*self.config())
            .finish()
    }
}

impl PlatformAdBackend for StubAdBackend {
    fn initialize(&self, ad_unit_id: &str, done: FutureCallbackData<()>) {
        let latency = self.config().latency;
        if ad_unit_id.is_empty() {
            self.scheduler.schedule_once(
                move || done.complete(AdErrorCode::InvalidArgument.code(), "Ad unit id is empty."),
                latency,
            );
            return;
        }
        log::debug!("stub backend initializing ad unit {ad_unit_id}");
        self.scheduler
            .schedule_once(move || done.complete(AdErrorCode::None.code(), ""), latency);
    }

    fn load_ad(&self, request: &AdRequest, done: FutureCallbackData<AdResult>) {
        let config = self.config().clone();
        let malformed = request
            .extras()
            .keys()
            .any(|adapter| adapter.trim().is_empty());
        let outcome = if malformed {
            Err(AdError::new(
                AdErrorCode::InvalidRequest,
                STUB_ERROR_DOMAIN,
                AD_COULD_NOT_PARSE_AD_REQUEST_ERROR_MESSAGE,
            ))
        } else {
            config.load_error.map_or(Ok(()), Err)
        };

        let response_id = format!("stub-{}", done.handle().get().id());
        self.scheduler.schedule_once(
            move || match outcome {
                Ok(()) => done.complete_with_result(
                    AdErrorCode::None.code(),
                    "",
                    AdResult::success(ResponseInfo {
                        response_id,
                        mediation_adapter_class_name: "StubAdapter".into(),
                    }),
                ),
                Err(error) => {
                    let (code, message) = (error.code.code(), error.message.clone());
                    done.complete_with_result(code, &message, AdResult::failure(error));
                }
            },
            config.latency,
        );
    }

    fn show(&self, listener: Option<UserEarnedRewardListener>, done: FutureCallbackData<()>) {
        let config = self.config().clone();
        self.scheduler.schedule_once(
            move || {
                if let Some(listener) = listener {
                    listener(&config.reward);
                }
                done.complete(AdErrorCode::None.code(), "");
            },
            config.latency,
        );
    }
}
