use thiserror::Error;

/// Failure taxonomy for one message moving through the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Topic extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Graph write failed: {0}")]
    GraphWriteFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IngestError {
    /// Short machine-friendly name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedMessage(_) => "malformed_message",
            IngestError::ExtractionFailed(_) => "extraction_failed",
            IngestError::GraphWriteFailed(_) => "graph_write_failed",
            IngestError::Config(_) => "config",
            IngestError::Anyhow(_) => "unclassified",
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
