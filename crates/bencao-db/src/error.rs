//! Storage error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the failure is worth retrying: network trouble, timeouts,
    /// throttling and server-side errors. Constraint violations and
    /// malformed requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| is_transient_status(s.as_u16())).unwrap_or(false)
            }
            DbError::Api { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> DbError {
        DbError::Api { status, code: None, message: "x".to_string() }
    }

    #[test]
    fn test_server_errors_and_throttling_are_transient() {
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(api(408).is_transient());
    }

    #[test]
    fn test_client_errors_and_duplicates_are_not_transient() {
        assert!(!api(400).is_transient());
        assert!(!api(401).is_transient());
        assert!(!DbError::Duplicate("name".to_string()).is_transient());
        assert!(!DbError::Config("bad url".to_string()).is_transient());
    }
}
