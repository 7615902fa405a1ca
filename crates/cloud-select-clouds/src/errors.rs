use thiserror::Error;

/// Provider-specific errors for cloud-select-clouds
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Unknown cloud: {0}")]
    UnknownCloud(String),

    #[error("Core domain error: {0}")]
    Core(#[from] cloud_select_core::SelectError),

    #[error("Utils error: {0}")]
    Utils(#[from] cloud_select_utils::UtilsError),
}

pub type Result<T> = std::result::Result<T, CloudError>;
