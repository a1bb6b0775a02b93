/// Result type alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, ActuatorError>;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{field} must be of type {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("The variable {field} is not in the allow-list, currently allowed: {allowed}")]
    PermissionDenied { field: String, allowed: String },

    #[error("Variable {0} is neither in the allow-list nor defined")]
    UndefinedOrForbidden(String),

    #[error("Event source closed")]
    SourceClosed,

    #[error("Event source failed: {0}")]
    Source(#[source] anyhow::Error),
}
