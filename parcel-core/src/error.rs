use thiserror::Error;

use crate::client::ApiError;

#[derive(Error, Debug)]
pub enum ParcelError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_pass_through_unchanged() {
        let err: ParcelError = ApiError::Api {
            status: 503,
            message: "Service unavailable".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Service unavailable");
        assert!(matches!(err, ParcelError::Api(ApiError::Api { status: 503, .. })));
    }

    #[test]
    fn test_storage_error_names_its_source() {
        let err = ParcelError::Storage("session file is not a JSON object".to_string());
        assert_eq!(err.to_string(), "Storage error: session file is not a JSON object");
    }
}
