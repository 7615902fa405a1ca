use thiserror::Error;

/// Infrastructure-specific errors for cloud-select-utils
#[derive(Error, Debug)]
pub enum UtilsError {
    #[error("Failed to fetch {provider} catalog: {message}")]
    Fetch { provider: String, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Core domain error: {0}")]
    Core(#[from] cloud_select_core::SelectError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl UtilsError {
    pub fn fetch(provider: &str, message: impl Into<String>) -> Self {
        UtilsError::Fetch {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UtilsError>;
