use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    NoApp { app_name: String },
    BadAppName { app_name: String },
    DuplicateApp { app_name: String },
    AppDeleted { app_name: String },
    NoOptions,
    InvalidConfig { message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NoApp { app_name } => {
                write!(f, "No Firebase App '{app_name}' has been created - call initialize_app() first")
            }
            AppError::BadAppName { app_name } => write!(f, "Illegal App name: '{app_name}'"),
            AppError::DuplicateApp { app_name } => write!(
                f,
                "Firebase App named '{app_name}' already exists with different options or settings"
            ),
            AppError::AppDeleted { app_name } => {
                write!(f, "Firebase App named '{app_name}' already deleted")
            }
            AppError::NoOptions => write!(f, "Need to provide options to initialize an App."),
            AppError::InvalidConfig { message } => {
                write!(f, "Failed to parse Firebase config: {message}")
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidConfig {
            message: err.to_string(),
        }
    }
}
