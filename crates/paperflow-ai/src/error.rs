use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Oracle response is not valid JSON: {0}")]
    MalformedResponse(String),

    #[error("Oracle returned no choices")]
    EmptyResponse,

    #[error("Missing API key: {0}")]
    MissingApiKey(String),
}

pub type Result<T> = std::result::Result<T, AiError>;
