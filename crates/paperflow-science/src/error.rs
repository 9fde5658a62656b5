use std::fmt;

use thiserror::Error;

use paperflow_ai::AiError;
use paperflow_core::{ConstructionError, StorageError};

/// One name that could not be mapped onto the remote vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown custom field '{0}'")]
    UnknownField(String),

    #[error("'{value}' is not an option of custom field '{field}'")]
    UnknownOption { field: String, value: String },

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("unknown document type '{0}'")]
    UnknownDocumentType(String),
}

/// Every resolution failure of one merge, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionErrors(pub Vec<ResolutionError>);

impl ResolutionErrors {
    pub fn push(&mut self, error: ResolutionError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ResolutionErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolutionError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was collected.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ResolutionErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ResolutionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ResolutionErrors {}

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("'{0}' is a search query, not an arXiv identifier")]
    NotAnIdentifier(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("classification failed: {0}")]
    Ai(#[from] AiError),

    #[error("cannot acquire content for '{title}': {reason}")]
    ContentAcquisition { title: String, reason: String },

    #[error("vocabulary resolution failed: {0}")]
    Resolution(#[from] ResolutionErrors),

    #[error("upload of '{title}' failed: {reason}")]
    UploadFailed { title: String, reason: String },

    #[error("metadata update of document {document_id} failed: {reason}")]
    UpdateFailed { document_id: u64, reason: String },

    #[error("consumption task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    #[error("consumption task {task_id} not finished after {polls} polls")]
    TaskTimeout { task_id: String, polls: u32 },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_errors_are_reported_together() {
        let mut errors = ResolutionErrors::default();
        errors.push(ResolutionError::UnknownField("Reviewer".into()));
        errors.push(ResolutionError::UnknownOption {
            field: "Tags".into(),
            value: "Blockchain".into(),
        });
        let message = ScienceError::from(errors).to_string();
        assert_eq!(
            message,
            "vocabulary resolution failed: unknown custom field 'Reviewer'; \
             'Blockchain' is not an option of custom field 'Tags'"
        );
    }

    #[test]
    fn empty_collection_is_ok() {
        assert_eq!(ResolutionErrors::default().into_result(3), Ok(3));
    }
}
