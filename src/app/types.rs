use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::app::cleanup::CleanupNotifier;
use crate::app::errors::{AppError, AppResult};

/// Project settings an App is created with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseOptions {
    pub api_key: Option<String>,
    pub app_id: Option<String>,
    pub project_id: Option<String>,
    pub database_url: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub ga_tracking_id: Option<String>,
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseAppSettings {
    pub name: Option<String>,
    pub automatic_data_collection_enabled: Option<bool>,
}

/// Handle to an initialized App.
///
/// Clones share the same App. Objects created for an App register teardown
/// callbacks with its [`CleanupNotifier`]; those run when the App is deleted.
#[derive(Clone)]
pub struct FirebaseApp {
    inner: Arc<FirebaseAppInner>,
}

struct FirebaseAppInner {
    name: String,
    options: FirebaseOptions,
    automatic_data_collection_enabled: Mutex<bool>,
    is_deleted: AtomicBool,
    cleanup: CleanupNotifier,
}

impl FirebaseApp {
    pub(crate) fn new(name: impl Into<String>, options: FirebaseOptions, automatic: bool) -> Self {
        Self {
            inner: Arc::new(FirebaseAppInner {
                name: name.into(),
                options,
                automatic_data_collection_enabled: Mutex::new(automatic),
                is_deleted: AtomicBool::new(false),
                cleanup: CleanupNotifier::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> FirebaseOptions {
        self.inner.options.clone()
    }

    pub fn automatic_data_collection_enabled(&self) -> bool {
        *self
            .inner
            .automatic_data_collection_enabled
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn set_automatic_data_collection_enabled(&self, value: bool) {
        *self
            .inner
            .automatic_data_collection_enabled
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = value;
    }

    pub fn cleanup_notifier(&self) -> &CleanupNotifier {
        &self.inner.cleanup
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.is_deleted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_is_deleted(&self, value: bool) {
        self.inner.is_deleted.store(value, Ordering::SeqCst);
    }

    pub fn check_destroyed(&self) -> AppResult<()> {
        if self.is_deleted() {
            return Err(AppError::AppDeleted {
                app_name: self.name().to_owned(),
            });
        }
        Ok(())
    }

    /// True when both handles refer to the same App.
    pub fn ptr_eq(&self, other: &FirebaseApp) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for FirebaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseApp")
            .field("name", &self.name())
            .field("is_deleted", &self.is_deleted())
            .field(
                "automatic_data_collection_enabled",
                &self.automatic_data_collection_enabled(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cleanup::CleanupKey;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dropping_the_last_handle_runs_cleanup() {
        let app = FirebaseApp::new("drop-test", FirebaseOptions::default(), true);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        app.cleanup_notifier().register_object(CleanupKey::unique(), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let other = app.clone();
        drop(app);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(other);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deleted_app_reports_error() {
        let app = FirebaseApp::new("deleted", FirebaseOptions::default(), true);
        assert!(app.check_destroyed().is_ok());
        app.set_is_deleted(true);
        assert_eq!(
            app.check_destroyed(),
            Err(AppError::AppDeleted {
                app_name: "deleted".into()
            })
        );
    }
}
