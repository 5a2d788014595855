use crate::app::constants::DEFAULT_ENTRY_NAME;
use crate::app::errors::{AppError, AppResult};
use crate::app::logger::{self, LogCallback, LogLevel, LogOptions, LOGGER};
use crate::app::registry;
use crate::app::types::{FirebaseApp, FirebaseAppSettings, FirebaseOptions};

pub static SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

fn normalize_name(settings: &FirebaseAppSettings) -> AppResult<String> {
    let name = settings
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_ENTRY_NAME.to_string());
    if name.trim().is_empty() {
        return Err(AppError::BadAppName { app_name: name });
    }
    Ok(name)
}

fn options_are_defined(options: &FirebaseOptions) -> bool {
    options != &FirebaseOptions::default()
}

/// Creates and registers an App, or returns the existing one when an App with
/// the same name and identical options and settings exists.
pub fn initialize_app(
    options: FirebaseOptions,
    settings: Option<FirebaseAppSettings>,
) -> AppResult<FirebaseApp> {
    let settings = settings.unwrap_or_default();
    let name = normalize_name(&settings)?;
    let automatic = settings.automatic_data_collection_enabled.unwrap_or(true);

    if !options_are_defined(&options) {
        return Err(AppError::NoOptions);
    }

    let mut apps = registry::apps_guard();
    if let Some(existing) = apps.get(&name) {
        if existing.options() == options && existing.automatic_data_collection_enabled() == automatic {
            return Ok(existing.clone());
        }
        return Err(AppError::DuplicateApp { app_name: name });
    }

    let app = FirebaseApp::new(name.clone(), options, automatic);
    apps.insert(name.clone(), app.clone());
    drop(apps);

    LOGGER.debug(format!("Firebase App '{name}' initialized"));
    Ok(app)
}

pub fn get_app(name: Option<&str>) -> AppResult<FirebaseApp> {
    let lookup = name.unwrap_or(DEFAULT_ENTRY_NAME);
    if let Some(app) = registry::apps_guard().get(lookup) {
        return Ok(app.clone());
    }
    Err(AppError::NoApp {
        app_name: lookup.to_string(),
    })
}

pub fn get_apps() -> Vec<FirebaseApp> {
    registry::apps_guard().values().cloned().collect()
}

/// Unregisters the App and tears down every object registered with its
/// cleanup notifier. Other handles to the App report `is_deleted()` afterwards.
pub fn delete_app(app: &FirebaseApp) -> AppResult<()> {
    let removed = {
        let mut apps = registry::apps_guard();
        match apps.get(app.name()) {
            Some(registered) if registered.ptr_eq(app) => apps.remove(app.name()),
            _ => None,
        }
    };

    if removed.is_none() && app.is_deleted() {
        return Ok(());
    }

    app.set_is_deleted(true);
    app.cleanup_notifier().cleanup_all();
    LOGGER.debug(format!("Firebase App '{}' deleted", app.name()));
    Ok(())
}

pub fn on_log(callback: Option<LogCallback>, options: Option<LogOptions>) -> AppResult<()> {
    logger::set_user_log_handler(callback, options);
    Ok(())
}

pub fn set_log_level(level: LogLevel) {
    let _ = logger::set_log_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cleanup::CleanupKey;
    use crate::test_support::unique_app_name;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, LazyLock, Mutex};

    static DEFAULT_APP_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn test_options() -> FirebaseOptions {
        FirebaseOptions {
            api_key: Some("test-key".to_string()),
            project_id: Some("test-project".to_string()),
            app_id: Some("1:123:android:test".to_string()),
            ..Default::default()
        }
    }

    fn named(name: &str) -> Option<FirebaseAppSettings> {
        Some(FirebaseAppSettings {
            name: Some(name.to_string()),
            automatic_data_collection_enabled: None,
        })
    }

    #[test]
    fn initialize_app_creates_default_app() {
        let _guard = DEFAULT_APP_GUARD.lock().unwrap_or_else(|poison| poison.into_inner());
        let app = initialize_app(test_options(), None).expect("init app");
        assert_eq!(app.name(), DEFAULT_ENTRY_NAME);
        let fetched = get_app(None).expect("get app");
        assert!(fetched.ptr_eq(&app));
        delete_app(&app).expect("delete");
        assert!(matches!(get_app(None), Err(AppError::NoApp { .. })));
    }

    #[test]
    fn initialize_app_creates_named_app() {
        let name = unique_app_name("named");
        let app = initialize_app(test_options(), named(&name)).expect("init named app");
        assert_eq!(app.name(), name);
        assert!(get_apps().iter().any(|candidate| candidate.ptr_eq(&app)));
    }

    #[test]
    fn initialize_app_with_same_options_returns_same_instance() {
        let name = unique_app_name("same");
        let first = initialize_app(test_options(), named(&name)).expect("first init");
        let second = initialize_app(test_options(), named(&name)).expect("second init");
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn initialize_app_duplicate_options_fails() {
        let name = unique_app_name("dup-app");
        initialize_app(test_options(), named(&name)).expect("first init");
        let mut other = test_options();
        other.api_key = Some("other-key".to_string());
        let result = initialize_app(other, named(&name));
        assert!(matches!(result, Err(AppError::DuplicateApp { .. })));
    }

    #[test]
    fn initialize_app_without_options_fails() {
        let result = initialize_app(FirebaseOptions::default(), named(&unique_app_name("empty")));
        assert_eq!(result.unwrap_err(), AppError::NoOptions);
    }

    #[test]
    fn blank_app_name_is_rejected() {
        let result = initialize_app(test_options(), named("  "));
        assert!(matches!(result, Err(AppError::BadAppName { .. })));
    }

    #[test]
    fn automatic_data_collection_respects_setting() {
        let app = initialize_app(
            test_options(),
            Some(FirebaseAppSettings {
                name: Some(unique_app_name("collection")),
                automatic_data_collection_enabled: Some(false),
            }),
        )
        .expect("init app");
        assert!(!app.automatic_data_collection_enabled());
    }

    #[test]
    fn delete_app_runs_cleanup_once_and_unregisters() {
        let name = unique_app_name("delete");
        let app = initialize_app(test_options(), named(&name)).expect("init app");
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        app.cleanup_notifier()
            .register_object(CleanupKey::unique(), move || {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        delete_app(&app).expect("delete");
        assert!(app.is_deleted());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(get_app(Some(&name)), Err(AppError::NoApp { .. })));

        delete_app(&app).expect("second delete");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_app_nonexistent_fails() {
        let result = get_app(Some("missing-app"));
        assert!(matches!(result, Err(AppError::NoApp { .. })));
    }
}
