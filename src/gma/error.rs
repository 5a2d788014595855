use std::fmt;

pub(crate) const AD_ALREADY_INITIALIZED_ERROR_MESSAGE: &str = "Ad is already initialized.";
pub(crate) const AD_COULD_NOT_PARSE_AD_REQUEST_ERROR_MESSAGE: &str = "Could Not Parse AdRequest.";
pub(crate) const AD_LOAD_IN_PROGRESS_ERROR_MESSAGE: &str = "Ad is currently loading.";
pub(crate) const AD_UNINITIALIZED_ERROR_MESSAGE: &str = "Ad has not been fully initialized.";

/// Error codes reported through `Future::error()` by ad operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AdErrorCode {
    #[default]
    None = 0,
    Uninitialized,
    AlreadyInitialized,
    LoadInProgress,
    InternalError,
    InvalidRequest,
    NetworkError,
    NoFill,
    NoWindowToken,
    AdNetworkClassLoadError,
    ServerError,
    OsVersionTooLow,
    Timeout,
    InterstitialAlreadyUsed,
    MediationDataError,
    MediationAdapterError,
    MediationInvalidAdSize,
    InvalidArgument,
    ReceivedInvalidResponse,
    RewardedAdAlreadyUsed,
    MediationNoFill,
    AdAlreadyUsed,
    ApplicationIdentifierMissing,
    InvalidAdString,
    AppNotInForeground,
    MediationShowError,
    AdNotReady,
    AdTooLarge,
    NotMainThread,
    NotInTestMode,
    InspectorFailedToLoad,
    InspectorAlreadyOpen,
    Unknown,
}

const ALL_CODES: [AdErrorCode; 33] = [
    AdErrorCode::None,
    AdErrorCode::Uninitialized,
    AdErrorCode::AlreadyInitialized,
    AdErrorCode::LoadInProgress,
    AdErrorCode::InternalError,
    AdErrorCode::InvalidRequest,
    AdErrorCode::NetworkError,
    AdErrorCode::NoFill,
    AdErrorCode::NoWindowToken,
    AdErrorCode::AdNetworkClassLoadError,
    AdErrorCode::ServerError,
    AdErrorCode::OsVersionTooLow,
    AdErrorCode::Timeout,
    AdErrorCode::InterstitialAlreadyUsed,
    AdErrorCode::MediationDataError,
    AdErrorCode::MediationAdapterError,
    AdErrorCode::MediationInvalidAdSize,
    AdErrorCode::InvalidArgument,
    AdErrorCode::ReceivedInvalidResponse,
    AdErrorCode::RewardedAdAlreadyUsed,
    AdErrorCode::MediationNoFill,
    AdErrorCode::AdAlreadyUsed,
    AdErrorCode::ApplicationIdentifierMissing,
    AdErrorCode::InvalidAdString,
    AdErrorCode::AppNotInForeground,
    AdErrorCode::MediationShowError,
    AdErrorCode::AdNotReady,
    AdErrorCode::AdTooLarge,
    AdErrorCode::NotMainThread,
    AdErrorCode::NotInTestMode,
    AdErrorCode::InspectorFailedToLoad,
    AdErrorCode::InspectorAlreadyOpen,
    AdErrorCode::Unknown,
];

impl AdErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for AdErrorCode {
    type Error = GmaError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|index| ALL_CODES.get(index).copied())
            .ok_or(GmaError::UnknownErrorCode(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmaError {
    UnknownErrorCode(i32),
}

impl fmt::Display for GmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GmaError::UnknownErrorCode(code) => write!(f, "Unknown ad error code {code}"),
        }
    }
}

impl std::error::Error for GmaError {}
