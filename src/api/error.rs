//! Errors reported by the remote data access layer.

use thiserror::Error;

/// Failure of a single call against the data API.
///
/// Variants carry owned strings so the error can be cloned into the shared
/// resolution results kept by the resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URL (without query string)
        url: String,
        /// Error message extracted from the OData error payload, or the raw body
        message: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Request to {url} failed: {reason}")]
    Transport {
        /// Request URL (without query string)
        url: String,
        /// Transport-level failure description
        reason: String,
    },

    /// The response body did not match the expected shape.
    #[error("Failed to decode response from {url}: {reason}")]
    Decode {
        /// Request URL (without query string)
        url: String,
        /// Deserialization failure description
        reason: String,
    },

    /// A record addressed by id does not exist.
    #[error("{entity_set} record '{id}' not found")]
    RecordNotFound {
        /// Entity set (collection) that was addressed
        entity_set: String,
        /// Identifier that did not match a record
        id: String,
    },

    /// The operation is not available for the addressed relationship.
    #[error("Operation not supported: {message}")]
    NotSupported {
        /// Server or store explanation
        message: String,
    },
}

impl ApiError {
    /// Whether the error means "the addressed thing does not exist".
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. } | Self::RecordNotFound { .. })
    }

    /// Whether the server rejected the operation for the relationship itself.
    pub fn is_not_supported(&self) -> bool {
        match self {
            Self::NotSupported { .. } | Self::Status { status: 405, .. } => true,
            Self::Status { status: 400, message, .. } => {
                message.to_ascii_lowercase().contains("not supported")
            }
            _ => false,
        }
    }
}

/// Result alias for data API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let error = ApiError::Status {
            status: 404,
            url: "https://org.example/api/data/v9.2/RelationshipDefinitions".to_string(),
            message: "Resource not found for the segment".to_string(),
        };
        assert!(error.is_not_found());
        assert!(!error.is_not_supported());

        let error = ApiError::RecordNotFound {
            entity_set: "contacts".to_string(),
            id: "42".to_string(),
        };
        assert!(error.is_not_found());
    }

    #[test]
    fn test_not_supported_classification() {
        let error = ApiError::Status {
            status: 400,
            url: "https://org.example/api/data/v9.2/accounts".to_string(),
            message: "Associate is not supported for entity connection".to_string(),
        };
        assert!(error.is_not_supported());

        let error = ApiError::Transport {
            url: "https://org.example".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(!error.is_not_supported());
    }
}
