use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::future::{FutureResult, Payload, PayloadKind};
use crate::gma::error::AdErrorCode;

/// Targeting information sent with an ad load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdRequest {
    content_url: Option<String>,
    keywords: BTreeSet<String>,
    neighboring_content_urls: BTreeSet<String>,
    // adapter class name -> key -> value
    extras: BTreeMap<String, BTreeMap<String, String>>,
}

impl AdRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_url(content_url: impl Into<String>) -> Self {
        Self {
            content_url: Some(content_url.into()),
            ..Self::default()
        }
    }

    pub fn content_url(&self) -> Option<&str> {
        self.content_url.as_deref()
    }

    pub fn set_content_url(&mut self, content_url: impl Into<String>) {
        self.content_url = Some(content_url.into());
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn add_keyword(&mut self, keyword: impl Into<String>) {
        let keyword = keyword.into();
        if !keyword.is_empty() {
            self.keywords.insert(keyword);
        }
    }

    pub fn neighboring_content_urls(&self) -> &BTreeSet<String> {
        &self.neighboring_content_urls
    }

    pub fn add_neighboring_content_urls<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.neighboring_content_urls
            .extend(urls.into_iter().map(Into::into));
    }

    pub fn extras(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.extras
    }

    pub fn add_extra(
        &mut self,
        adapter_class_name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.extras
            .entry(adapter_class_name.into())
            .or_default()
            .insert(key.into(), value.into());
    }
}

/// Failure details of an ad operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdError {
    pub code: AdErrorCode,
    pub domain: String,
    pub message: String,
}

impl AdError {
    pub fn new(code: AdErrorCode, domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            domain: domain.into(),
            message: message.into(),
        }
    }
}

/// Information about the ad network response that served an ad.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub response_id: String,
    pub mediation_adapter_class_name: String,
}

/// Result of an ad load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdResult {
    ad_error: Option<AdError>,
    response_info: ResponseInfo,
}

impl AdResult {
    pub fn success(response_info: ResponseInfo) -> Self {
        Self {
            ad_error: None,
            response_info,
        }
    }

    pub fn failure(ad_error: AdError) -> Self {
        Self {
            ad_error: Some(ad_error),
            response_info: ResponseInfo::default(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.ad_error.is_none()
    }

    pub fn ad_error(&self) -> Option<&AdError> {
        self.ad_error.as_ref()
    }

    pub fn response_info(&self) -> &ResponseInfo {
        &self.response_info
    }
}

impl FutureResult for AdResult {
    fn kind() -> PayloadKind {
        PayloadKind::Record("gma::AdResult")
    }

    fn into_payload(self) -> Payload {
        let mut fields = vec![
            ("response_id", Payload::Text(self.response_info.response_id)),
            (
                "mediation_adapter_class_name",
                Payload::Text(self.response_info.mediation_adapter_class_name),
            ),
        ];
        if let Some(error) = self.ad_error {
            fields.push(("error_code", Payload::Int64(i64::from(error.code.code()))));
            fields.push(("error_domain", Payload::Text(error.domain)));
            fields.push(("error_message", Payload::Text(error.message)));
        }
        Payload::record(fields)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        let text = |name: &str| payload.field(name).and_then(Payload::as_str).map(str::to_owned);
        let response_info = ResponseInfo {
            response_id: text("response_id")?,
            mediation_adapter_class_name: text("mediation_adapter_class_name")?,
        };
        let ad_error = match payload.field("error_code").and_then(Payload::as_i64) {
            Some(code) => Some(AdError {
                code: i32::try_from(code)
                    .ok()
                    .and_then(|code| AdErrorCode::try_from(code).ok())
                    .unwrap_or(AdErrorCode::Unknown),
                domain: text("error_domain").unwrap_or_default(),
                message: text("error_message").unwrap_or_default(),
            }),
            None => None,
        };
        Some(Self {
            ad_error,
            response_info,
        })
    }
}

/// Reward granted to the user for watching a rewarded ad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdReward {
    reward_type: String,
    amount: i64,
}

impl AdReward {
    pub fn new(reward_type: impl Into<String>, amount: i64) -> Self {
        Self {
            reward_type: reward_type.into(),
            amount,
        }
    }

    pub fn reward_type(&self) -> &str {
        &self.reward_type
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

/// Notified when the user earns a reward. Called from the backend's thread.
pub type UserEarnedRewardListener = Arc<dyn Fn(&AdReward) + Send + Sync + 'static>;
