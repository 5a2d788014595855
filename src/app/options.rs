use serde::Deserialize;

use crate::app::errors::{AppError, AppResult};
use crate::app::logger::LOGGER;
use crate::app::types::FirebaseOptions;

#[derive(Debug, Deserialize)]
struct GoogleServices {
    project_info: Option<ProjectInfo>,
    #[serde(default)]
    client: Vec<Client>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    firebase_url: Option<String>,
    project_number: Option<String>,
    storage_bucket: Option<String>,
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Client {
    client_info: Option<ClientInfo>,
    #[serde(default)]
    api_key: Vec<ApiKey>,
    services: Option<Services>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    mobilesdk_app_id: Option<String>,
    android_client_info: Option<AndroidClientInfo>,
}

#[derive(Debug, Deserialize)]
struct AndroidClientInfo {
    package_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiKey {
    current_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Services {
    analytics_service: Option<AnalyticsService>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsService {
    analytics_property: Option<AnalyticsProperty>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsProperty {
    tracking_id: Option<String>,
}

impl Client {
    fn package_name(&self) -> Option<&str> {
        self.client_info
            .as_ref()?
            .android_client_info
            .as_ref()?
            .package_name
            .as_deref()
    }

    fn tracking_id(&self) -> Option<String> {
        self.services
            .as_ref()?
            .analytics_service
            .as_ref()?
            .analytics_property
            .as_ref()?
            .tracking_id
            .clone()
    }
}

impl FirebaseOptions {
    /// Reads options from the contents of a `google-services.json` file.
    ///
    /// The first client with an Android package name supplies the client
    /// specific options. Unknown fields are ignored. Required options that are
    /// missing are reported as warnings, not errors.
    pub fn from_json_config(config: &str) -> AppResult<FirebaseOptions> {
        let services: GoogleServices = serde_json::from_str(config)?;
        let Some(project) = services.project_info else {
            return Err(AppError::InvalidConfig {
                message: "'project_info' not found in Firebase config.".into(),
            });
        };

        let mut options = FirebaseOptions {
            database_url: project.firebase_url,
            messaging_sender_id: project.project_number,
            storage_bucket: project.storage_bucket,
            project_id: project.project_id,
            ..Default::default()
        };

        let Some(client) = services
            .client
            .iter()
            .find(|client| client.package_name().is_some())
        else {
            return Err(AppError::InvalidConfig {
                message: "'client' data (oauth client ID, API key etc.) not found in Firebase config."
                    .into(),
            });
        };

        options.package_name = client.package_name().map(str::to_owned);
        options.api_key = client
            .api_key
            .iter()
            .find_map(|key| key.current_key.clone());
        options.app_id = client
            .client_info
            .as_ref()
            .and_then(|info| info.mobilesdk_app_id.clone());
        options.ga_tracking_id = client.tracking_id();

        let required = [
            (&options.database_url, "Database URL"),
            (&options.storage_bucket, "Storage bucket"),
            (&options.project_id, "Project ID"),
            (&options.api_key, "API key"),
            (&options.app_id, "App ID"),
        ];
        for (value, label) in required {
            if value.as_deref().map_or(true, str::is_empty) {
                LOGGER.warn(format!("{label} not set in the Firebase config."));
            }
        }

        Ok(options)
    }
}
