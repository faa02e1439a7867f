use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Unified error type for the core pipeline, consolidating provider- and
/// store-specific failures into the kinds enumerated by the error design.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(#[from] surrealdb::Error),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[from] OpenAIError),
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("partial enrichment: {0}")]
    PartialEnrichment(String),
    #[error("backpressure: {0}")]
    Backpressure(String),
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Error kind discriminant, matching the enumerated kinds of the error design.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInput",
            Self::NotFound(_) => "NotFound",
            Self::Forbidden(_) => "Forbidden",
            Self::Conflict(_) => "Conflict",
            Self::Unavailable(_) | Self::ProviderUnavailable(_) => "Unavailable",
            Self::DeadlineExceeded(_) => "DeadlineExceeded",
            Self::PartialEnrichment(_) => "PartialEnrichment",
            Self::Backpressure(_) => "Backpressure",
            Self::Join(_) | Self::Io(_) | Self::Internal(_) => "Internal",
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
