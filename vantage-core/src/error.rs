//! Error types for Vantage operations

use thiserror::Error;

/// Failures reported by the remote resource service.
///
/// The type is `Clone` because a single failed fetch is delivered to every
/// caller that coalesced onto it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found: {name}")]
    NotFound { name: String },

    #[error("Permission denied on {name}: {reason}")]
    Unauthorized { name: String, reason: String },

    #[error("Service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed response for {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Invalid resource name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl ResourceError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Transport-class failures. A later call for the same resource may
    /// succeed, so the caller is free to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Malformed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Namespace {namespace} already holds a different value type than {value_type}")]
    NamespaceTypeMismatch {
        namespace: String,
        value_type: &'static str,
    },

    #[error("Invalid cache key component {component:?}: {reason}")]
    InvalidKeyComponent { component: String, reason: String },

    #[error("Cache key must have at least one component")]
    EmptyKey,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Durable local store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("IO error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization error for key {key}: {reason}")]
    Serde { key: String, reason: String },
}

/// Master error type for all Vantage errors.
#[derive(Debug, Clone, Error)]
pub enum VantageError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias for resource service calls.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type alias for Vantage operations.
pub type VantageResult<T> = Result<T, VantageError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_display_not_found() {
        let err = ResourceError::not_found("projects/acme");
        let msg = format!("{}", err);
        assert!(msg.contains("Resource not found"));
        assert!(msg.contains("projects/acme"));
    }

    #[test]
    fn test_resource_error_retryable_classes() {
        assert!(ResourceError::unavailable("connection reset").is_retryable());
        assert!(ResourceError::Malformed {
            name: "users/a@b.c".to_string(),
            reason: "missing email".to_string(),
        }
        .is_retryable());
        assert!(!ResourceError::not_found("projects/acme").is_retryable());
        assert!(!ResourceError::Unauthorized {
            name: "projects/acme".to_string(),
            reason: "bb.projects.get".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_cache_error_display_type_mismatch() {
        let err = CacheError::NamespaceTypeMismatch {
            namespace: "project-by-name".to_string(),
            value_type: "vantage_core::entities::User",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("project-by-name"));
        assert!(msg.contains("User"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "batch_get_limit".to_string(),
            value: "0".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("batch_get_limit"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn test_vantage_error_from_variants() {
        let cache = VantageError::from(CacheError::EmptyKey);
        assert!(matches!(cache, VantageError::Cache(_)));

        let config = VantageError::from(ConfigError::Parse {
            reason: "expected table".to_string(),
        });
        assert!(matches!(config, VantageError::Config(_)));

        let persistence = VantageError::from(PersistenceError::Io {
            path: "/tmp/x".to_string(),
            reason: "denied".to_string(),
        });
        assert!(matches!(persistence, VantageError::Persistence(_)));
    }
}
