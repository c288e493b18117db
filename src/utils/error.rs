use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No valid token available for platform: {platform}")]
    TokenUnavailable { platform: String },

    #[error("Token refresh rejected for platform {platform}: {reason}")]
    RefreshFailed { platform: String, reason: String },

    #[error("Account locked: {platform}/{username}")]
    AccountLocked { platform: String, username: String },

    #[error("No eligible account for platform: {platform}")]
    NoEligibleAccount { platform: String },

    #[error("Unsupported platform: {name}")]
    UnsupportedPlatform { name: String },

    #[error("No active template for platform {platform} ({kind})")]
    NoTemplateAvailable { platform: String, kind: String },

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_unsupported_platform_message() {
        let err = AppError::UnsupportedPlatform {
            name: "xyz".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported platform: xyz");
    }

    #[test]
    fn test_token_unavailable_message() {
        let err = AppError::TokenUnavailable {
            platform: "naver".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No valid token available for platform: naver"
        );
    }

    #[test]
    fn test_no_template_message() {
        let err = AppError::NoTemplateAvailable {
            platform: "coupang".to_string(),
            kind: "api".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No active template for platform coupang (api)"
        );
    }
}
