use thiserror::Error;

/// Errors surfaced by the terrain pipeline.
///
/// Every variant is a configuration error: the pipeline is pure and
/// deterministic for valid input, so nothing here is retryable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TerrainError {
    #[error("grid must be at least 3x3, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("non-finite height at index {index}")]
    NonFinite { index: usize },
}

impl TerrainError {
    pub(crate) fn param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TerrainError>;
