//! Paperflow AI: the classification oracle that picks tags and keywords for
//! an uploaded document.

pub mod error;
pub mod openai;
pub mod oracle;
pub mod response;

pub use error::{AiError, Result};
pub use openai::{OpenAiConfig, OpenAiOracle};
pub use oracle::{Classification, ClassificationOracle, ClassificationRequest};
