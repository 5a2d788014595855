//! App lifecycle: options, the process-wide App registry and the per-App
//! cleanup notifier that tears down objects created for an App.
mod api;
mod cleanup;
mod constants;
mod errors;
mod logger;
mod options;
mod registry;
mod types;

#[doc(inline)]
pub use api::{delete_app, get_app, get_apps, initialize_app, on_log, set_log_level, SDK_VERSION};

#[doc(inline)]
pub use cleanup::{CleanupKey, CleanupNotifier};

#[doc(inline)]
pub use constants::DEFAULT_ENTRY_NAME;

#[doc(inline)]
pub use errors::{AppError, AppResult};

// Used in other modules
#[doc(inline)]
pub use logger::{LogCallback, LogLevel, LogOptions, Logger, LOGGER};

#[doc(inline)]
pub use types::{FirebaseApp, FirebaseAppSettings, FirebaseOptions};
