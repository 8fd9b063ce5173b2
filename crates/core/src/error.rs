use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid criteria schema: {0}")]
    InvalidCriteria(String),

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("all {failed} chunk(s) of {document} failed in transport; last error: {last_error}")]
    AllChunksFailed {
        document: String,
        failed: usize,
        last_error: String,
    },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing API credential: set {0}")]
    MissingCredential(String),

    #[error("credential rejected ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed completion response: {0}")]
    Response(String),

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited(_) | LlmError::Timeout(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Http(error) => !error.is_builder() && !error.is_decode(),
            LlmError::MissingCredential(_)
            | LlmError::Unauthorized { .. }
            | LlmError::Response(_) => false,
        }
    }

    /// Failures that will repeat for every chunk of every document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::MissingCredential(_) | LlmError::Unauthorized { .. }
        )
    }
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
