use thiserror::Error;

#[derive(Error, Debug)]
pub enum HgnError {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Rollout sequence error: {0}")]
    Sequence(String),

    #[error("Non-finite loss: reconstruction={reconstruction}, kl={kl:?}")]
    NonFiniteLoss { reconstruction: f64, kl: Option<f64> },

    #[error("Non-finite gradient for parameter '{name}'")]
    NonFiniteGradient { name: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HgnError {
    /// Shorthand for the most common failure: malformed dimensions.
    pub fn shape(message: impl Into<String>) -> Self {
        HgnError::Shape(message.into())
    }
}

pub type HgnResult<T> = Result<T, HgnError>;
