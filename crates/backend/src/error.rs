//! Backend error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend setup failed: {0}")]
    Setup(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("could not parse completion text from response (unexpected schema)")]
    UnexpectedSchema,

    #[error("{primary} | fallback: {fallback}")]
    FallbackExhausted { primary: String, fallback: String },

    #[error("inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
