use thiserror::Error;

/// Application-wide error types for sirens.
#[derive(Error, Debug)]
pub enum AppError {
    /// A pattern or sub-config cannot be compiled (no handler, no parser, bad value).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A `module:name` reference failed to resolve.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// The configuration or a request broke an invariant the core relies on.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Fetched payload could not be decoded or parsed (HTML, XML, gzip).
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML config could not be parsed.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Failure to resolve a `module:name` reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Malformed reference '{0}': expected 'module:name'")]
    Malformed(String),

    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error("Unknown function '{name}' in module '{module}'")]
    UnknownName { module: String, name: String },

    #[error("Reference '{reference}' is a {found} function, expected {expected}")]
    WrongKind {
        reference: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Reference '{0}' has no module and no default 'file' is configured")]
    NoDefaultModule(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error means the configuration itself is broken.
    ///
    /// Fatal errors abort startup; at request time they still indicate a
    /// broken config rather than a transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::ConfigError(_) | AppError::Reference(_) | AppError::ContractViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::HttpError("connect refused".into()).is_retryable());
        assert!(!AppError::HttpError("HTTP 404 for x".into()).is_retryable());
        assert!(!AppError::DecodeError("bad gzip".into()).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(AppError::ConfigError("no handler".into()).is_fatal());
        assert!(AppError::ContractViolation("without name".into()).is_fatal());
        assert!(AppError::from(ReferenceError::UnknownModule("m".into())).is_fatal());
        assert!(!AppError::DecodeError("bad html".into()).is_fatal());
        assert!(!AppError::Timeout(5).is_fatal());
    }

    #[test]
    fn test_reference_error_message() {
        let err = AppError::from(ReferenceError::UnknownName {
            module: "hooks".into(),
            name: "fetch".into(),
        });
        assert_eq!(
            err.to_string(),
            "Unknown function 'fetch' in module 'hooks'"
        );
    }
}
