use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed filter condition '{id}': {reason}")]
    MalformedCondition { id: String, reason: String },

    #[error("Operator '{operator}' is not allowed on {kind} column '{column}'")]
    OperatorNotAllowed {
        column: String,
        kind: String,
        operator: String,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Segment count must be between 1 and 1000, got {0}")]
    InvalidSegmentCount(usize),

    #[error("Rule-based segmentation requires at least one rule")]
    MissingRules,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::MalformedCondition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while validating caller input rather than
    /// during execution.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedCondition { .. }
                | EngineError::OperatorNotAllowed { .. }
                | EngineError::UnknownColumn(_)
                | EngineError::InvalidSegmentCount(_)
                | EngineError::MissingRules
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
