//! Error types for the document agent workflow engine

use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {

    // =============================
    // Stage Errors
    // =============================

    #[error("Router fallback: {0}")]
    RouterFallback(String),

    #[error("Parameter extraction failed: {0}")]
    ParameterExtraction(String),

    #[error("External service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    #[error("No text selected: {0}")]
    NoSelection(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Synthesis failure: {0}")]
    Synthesis(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Host apply failed: {0}")]
    HostApply(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Stable error-kind tag used in `metadata.errors` entries.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::RouterFallback(_) => "RouterFallback",
            WorkflowError::ParameterExtraction(_) => "ParameterExtractionError",
            WorkflowError::ExternalServiceUnavailable(_) => "ExternalServiceUnavailable",
            WorkflowError::NoSelection(_) => "NoSelectionError",
            WorkflowError::Handler(_) => "HandlerError",
            WorkflowError::Synthesis(_) => "SynthesisFailure",
            WorkflowError::InvalidRequest(_) => "InvalidRequest",
            WorkflowError::Llm(_) => "LlmError",
            WorkflowError::HostApply(_) => "HostApplyError",
            WorkflowError::Serialization(_) => "SerializationError",
            WorkflowError::Http(_) => "HttpError",
            WorkflowError::Uuid(_) => "UuidError",
            WorkflowError::Io(_) => "IoError",
        }
    }
}
