//! Error types for the registry client

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors returned by outbound registry calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry could not be reached or answered with a transient failure
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Registry refused the request; retrying will not help
    #[error("Registry rejected request ({status}): {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// Registry answered 2xx with a body we could not decode
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RegistryError {
    /// Whether the call may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Unavailable(_) | RegistryError::InvalidResponse(_)
        )
    }

    /// Classify a non-success HTTP status and its body
    pub fn from_status(status: u16, body: &str) -> Self {
        if status >= 500 || status == 408 || status == 429 {
            return RegistryError::Unavailable(format!("HTTP {}", status));
        }

        let (code, message) = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                let error = json.get("error")?;
                let code = error.get("code")?.as_str()?.to_string();
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some((code, message))
            })
            .unwrap_or_else(|| (status.to_string(), body.trim().to_string()));

        RegistryError::Rejected {
            status,
            code,
            message,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            RegistryError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            RegistryError::InvalidResponse(err.to_string())
        } else {
            RegistryError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::InvalidResponse(err.to_string())
    }
}
