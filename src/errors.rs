use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudSelectError {
    #[error("{0}")]
    Select(#[from] cloud_select_core::SelectError),

    #[error("{0}")]
    Utils(#[from] cloud_select_utils::UtilsError),

    #[error("{0}")]
    Cloud(#[from] cloud_select_clouds::CloudError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Could not find home directory")]
    NoHomeDirectory,

    #[error("TOML parsing error: {0}")]
    TomlError(String),
}

pub type Result<T> = std::result::Result<T, CloudSelectError>;
