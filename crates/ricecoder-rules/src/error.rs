/// Validation rule engine error types
use thiserror::Error;

/// Errors that can occur in the validation rule engine
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Pattern compilation failed for '{pattern}': {message}")]
    PatternCompileFailed { pattern: String, message: String },

    #[error("Unsupported pattern type: {0}")]
    UnsupportedPatternType(String),

    #[error("Invalid auto-fix pattern: {0}")]
    InvalidAutoFix(String),

    #[error("Rule store error: {0}")]
    StoreError(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Rule promotion failed: {0}")]
    RulePromotionFailed(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for validation rule engine operations
pub type Result<T> = std::result::Result<T, RulesError>;
