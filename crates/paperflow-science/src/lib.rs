//! Paperflow Science: arXiv and site ingestion into Paperless-ngx, plus the
//! post-consume metadata merge.

pub mod error;
pub mod http;
pub mod identifiers;
pub mod arxiv;
pub mod paperless;
pub mod sources;
pub mod enrichment;

pub use error::{ResolutionError, ResolutionErrors, Result, ScienceError};
