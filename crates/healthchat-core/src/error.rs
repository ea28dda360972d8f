use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthchatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Upstream (or the proxy) answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl HealthchatError {
    /// Returns `true` when the server rejected the session credentials.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthenticated => true,
            Self::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HealthchatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_401() {
        let err = HealthchatError::Api {
            status: 401,
            message: "Authentication credentials were not provided.".into(),
        };
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_auth_failure_unauthenticated() {
        assert!(HealthchatError::Unauthenticated.is_auth_failure());
    }

    #[test]
    fn test_not_auth_failure_404() {
        let err = HealthchatError::Api {
            status: 404,
            message: "Not found.".into(),
        };
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_api_error_display() {
        let err = HealthchatError::Api {
            status: 400,
            message: "title is required".into(),
        };
        assert_eq!(err.to_string(), "API error 400: title is required");
    }

    #[test]
    fn test_invalid_input_not_auth_failure() {
        let err = HealthchatError::InvalidInput("empty message".into());
        assert!(!err.is_auth_failure());
    }
}
