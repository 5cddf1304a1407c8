use thiserror::Error;

/// Errors produced while preparing detector inputs or checking engine results.
#[derive(Debug, Error)]
pub enum MrcnnError {
    /// A malformed image or tensor. Fatal to the image being processed.
    #[error("construction failed: {0}")]
    Construction(String),
    /// Invalid pipeline configuration, detected before any image is processed.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The engine returned nothing, or something of an unexpected type or shape.
    #[error("unexpected engine result: {0}")]
    EngineResult(String),
    /// The engine itself failed to run.
    #[error("inference engine failed")]
    Engine(#[source] anyhow::Error),
}

impl MrcnnError {
    pub(crate) fn construction(message: impl Into<String>) -> Self {
        MrcnnError::Construction(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        MrcnnError::Configuration(message.into())
    }

    pub(crate) fn engine_result(message: impl Into<String>) -> Self {
        MrcnnError::EngineResult(message.into())
    }
}

pub type Result<T, E = MrcnnError> = std::result::Result<T, E>;
