//! Paperless-ngx REST client and vocabulary resolution.

pub mod client;
pub mod types;
pub mod vocabulary;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{DocumentStore, PaperlessClient};
pub use types::{
    DocumentUpload, FieldAssignment, FieldDataType, MetadataPatch, OptionId, Page, RemoteCustomField,
    RemoteDocument, RemoteDocumentType, RemoteTag, SelectOption, TaskId, TaskStatus,
};
pub use vocabulary::{Vocabulary, VocabularyResolver};
