//! Ingestion into Paperless and the post-consume metadata merge.

pub mod content;
pub mod merge;
pub mod pipeline;

#[cfg(test)]
mod tests;

pub use content::{ContentFetcher, HttpContentFetcher, Payload, safe_file_prefix};
pub use merge::{MergeOptions, MergeReport, MetadataMerger, Reconciler, ResyncOutcome, ResyncReport};
pub use pipeline::{BatchSummary, IngestOutcome, IngestionPipeline, ItemFailure, PipelineOptions};
