use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use paperflow_core::{DedupStore, DocumentRecord, NormalizedTitle};

use crate::arxiv::{ArxivSearch, PaperSearch};
use crate::enrichment::content::ContentFetcher;
use crate::enrichment::merge::{MergeReport, MetadataMerger};
use crate::error::{ResolutionErrors, Result, ScienceError};
use crate::identifiers::ImportInput;
use crate::paperless::{DocumentStore, DocumentUpload, TaskId, TaskStatus, VocabularyResolver};
use crate::sources::SiteScraper;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Poll the consumption task and merge inline after each upload.
    pub merge_after_upload: bool,
    pub task_poll_interval: Duration,
    pub task_max_polls: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            merge_after_upload: false,
            task_poll_interval: Duration::from_secs(2),
            task_max_polls: 30,
        }
    }
}

/// How one record left the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IngestOutcome {
    /// Already in the dedup store.
    Skipped,
    /// Handed to Paperless; the post-consume hook will merge metadata.
    Uploaded { task_id: String },
    /// Uploaded and merged inline.
    Synced { document_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub title: String,
    pub error: String,
}

/// Per-batch counts; individual failures never abort a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    /// The stop flag was raised before every item was started.
    pub stopped: bool,
}

impl BatchSummary {
    pub fn record(&mut self, title: &str, result: &Result<IngestOutcome>) {
        match result {
            Ok(IngestOutcome::Skipped) => self.skipped += 1,
            Ok(_) => self.succeeded += 1,
            Err(e) => self.fail(title, e),
        }
    }

    pub fn fail(&mut self, title: &str, error: &ScienceError) {
        tracing::error!(%title, %error, "item failed");
        self.failed += 1;
        self.failures.push(ItemFailure {
            title: title.to_string(),
            error: error.to_string(),
        });
    }

    pub fn absorb(&mut self, other: BatchSummary) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.failures.extend(other.failures);
        self.stopped |= other.stopped;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Dedup check, admission, content acquisition and upload for each record.
///
/// Records are processed one at a time. The stop flag is checked before each
/// new record; a record already started always runs to completion.
pub struct IngestionPipeline {
    dedup: Arc<dyn DedupStore>,
    store: Arc<dyn DocumentStore>,
    vocabulary: Arc<VocabularyResolver>,
    fetcher: Arc<dyn ContentFetcher>,
    merger: Option<Arc<MetadataMerger>>,
    options: PipelineOptions,
    stop: Arc<AtomicBool>,
}

impl IngestionPipeline {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        store: Arc<dyn DocumentStore>,
        vocabulary: Arc<VocabularyResolver>,
        fetcher: Arc<dyn ContentFetcher>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            dedup,
            store,
            vocabulary,
            fetcher,
            merger: None,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Merger used when `merge_after_upload` is set.
    pub fn with_merger(mut self, merger: Arc<MetadataMerger>) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Runs one record through the pipeline.
    ///
    /// Content is acquired before the title is recorded, so a failed download
    /// leaves nothing behind and a later run retries it. The title is marked
    /// as seen right before the upload; a failed upload leaves a seen entry
    /// that only a manual resync recovers.
    pub async fn ingest(&self, record: &DocumentRecord) -> Result<IngestOutcome> {
        let title = record.title();
        if self.dedup.has_been_seen(title)? {
            tracing::debug!(%title, "already seen");
            return Ok(IngestOutcome::Skipped);
        }

        let document_type = match &record.document_type {
            Some(name) => Some(
                self.vocabulary
                    .resolve_document_type(name)
                    .map_err(|e| ScienceError::Resolution(ResolutionErrors(vec![e])))?,
            ),
            None => None,
        };

        let payload = self.fetcher.acquire(record).await?;

        let snapshot = record.custom_fields(false);
        if !self
            .dedup
            .record_seen(title, record.created(), record.source(), Some(&snapshot))?
        {
            tracing::debug!(%title, "admitted concurrently elsewhere");
            return Ok(IngestOutcome::Skipped);
        }

        let task = self
            .store
            .upload(DocumentUpload {
                title: title.to_string(),
                created: record.created_iso(),
                document_type,
                file_name: payload.file_name,
                mime_type: payload.mime_type,
                bytes: payload.bytes,
            })
            .await?;

        match (&self.merger, self.options.merge_after_upload) {
            (Some(merger), true) => {
                let report = self.merge_when_consumed(merger, &task, record).await?;
                Ok(IngestOutcome::Synced {
                    document_id: report.document_id,
                })
            }
            _ => Ok(IngestOutcome::Uploaded { task_id: task.0 }),
        }
    }

    /// Merges with the record in hand, so ingest-time tags are applied.
    async fn merge_when_consumed(
        &self,
        merger: &MetadataMerger,
        task: &TaskId,
        record: &DocumentRecord,
    ) -> Result<MergeReport> {
        let document_id = self.wait_for_document(task).await?;
        let document = self.store.get_document(document_id).await?;
        merger.merge(&document, record.clone()).await
    }

    async fn wait_for_document(&self, task: &TaskId) -> Result<u64> {
        for poll in 0..self.options.task_max_polls {
            match self.store.task_status(task).await? {
                TaskStatus::Success {
                    document_id: Some(id),
                } => return Ok(id),
                TaskStatus::Success { document_id: None } => {
                    return Err(ScienceError::TaskFailed {
                        task_id: task.to_string(),
                        reason: "finished without a document".to_string(),
                    });
                }
                TaskStatus::Failure { reason } => {
                    return Err(ScienceError::TaskFailed {
                        task_id: task.to_string(),
                        reason,
                    });
                }
                status => {
                    tracing::debug!(task = %task, poll, ?status, "waiting for consumption");
                    sleep(self.options.task_poll_interval).await;
                }
            }
        }
        Err(ScienceError::TaskTimeout {
            task_id: task.to_string(),
            polls: self.options.task_max_polls,
        })
    }

    /// Ingests records in order, stopping early when the stop flag is set.
    pub async fn ingest_all<I>(&self, records: I) -> BatchSummary
    where
        I: IntoIterator<Item = DocumentRecord>,
    {
        let mut summary = BatchSummary::default();
        for record in records {
            if self.stopped() {
                summary.stopped = true;
                break;
            }
            let result = self.ingest(&record).await;
            summary.record(record.title().as_str(), &result);
        }
        summary
    }

    /// Imports arXiv papers by identifier. Inputs that are search queries
    /// fail individually.
    pub async fn import_ids(&self, search: &dyn PaperSearch, inputs: &[String]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for input in inputs {
            if self.stopped() {
                summary.stopped = true;
                break;
            }
            let id = match ImportInput::parse(input) {
                ImportInput::Identifier(id) => id,
                ImportInput::Search(query) => {
                    summary.fail(input, &ScienceError::NotAnIdentifier(query));
                    continue;
                }
            };
            let record = match search.fetch(&id).await {
                Ok(Some(entry)) => entry.to_record(&id.to_string()).map_err(ScienceError::from),
                Ok(None) => Err(ScienceError::DocumentNotFound(id.to_string())),
                Err(e) => Err(e),
            };
            match record {
                Ok(record) => {
                    let result = self.ingest(&record).await;
                    summary.record(record.title().as_str(), &result);
                }
                Err(e) => summary.fail(input, &e),
            }
        }
        summary
    }

    /// Ingests one page of search results.
    pub async fn search(&self, search: &dyn PaperSearch, query: &str, max_results: u32) -> Result<BatchSummary> {
        let entries = search.search(&ArxivSearch::new(query, 0, max_results)).await?;
        let mut summary = BatchSummary::default();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.to_record(query) {
                Ok(record) => records.push(record),
                Err(e) => summary.fail(&entry.title, &e.into()),
            }
        }
        summary.absorb(self.ingest_all(records).await);
        Ok(summary)
    }

    /// Pages through every query until an empty page.
    ///
    /// Titles handed off during this run are remembered in memory and not
    /// submitted twice, even when two queries return the same paper.
    pub async fn automate(
        &self,
        search: &dyn PaperSearch,
        queries: &[String],
        page_size: u32,
        max_pages: Option<u32>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut sent: HashSet<NormalizedTitle> = HashSet::new();
        let page_size = page_size.max(1);

        'queries: for query in queries {
            let mut start = 0;
            let mut pages = 0;
            loop {
                if self.stopped() {
                    summary.stopped = true;
                    break 'queries;
                }
                if max_pages.is_some_and(|max| pages >= max) {
                    break;
                }
                let entries = match search.search(&ArxivSearch::new(query.as_str(), start, page_size)).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        summary.fail(query, &e);
                        break;
                    }
                };
                if entries.is_empty() {
                    break;
                }
                tracing::info!(%query, start, results = entries.len(), "arxiv page");

                for entry in entries {
                    if self.stopped() {
                        summary.stopped = true;
                        break 'queries;
                    }
                    let record = match entry.to_record(query) {
                        Ok(record) => record,
                        Err(e) => {
                            summary.fail(&entry.title, &e.into());
                            continue;
                        }
                    };
                    if sent.contains(record.title()) {
                        summary.skipped += 1;
                        continue;
                    }
                    let result = self.ingest(&record).await;
                    if matches!(result, Ok(IngestOutcome::Uploaded { .. } | IngestOutcome::Synced { .. })) {
                        sent.insert(record.title().clone());
                    }
                    summary.record(record.title().as_str(), &result);
                }
                start += page_size;
                pages += 1;
            }
        }
        summary
    }

    /// Scrapes one site. Articles whose title is already known are skipped
    /// before their page is fetched.
    pub async fn scrape(&self, scraper: &SiteScraper) -> Result<BatchSummary> {
        let links = scraper.discover().await?;
        tracing::info!(site = scraper.name(), articles = links.len(), "discovered");

        let mut summary = BatchSummary::default();
        for link in links {
            if self.stopped() {
                summary.stopped = true;
                break;
            }
            match NormalizedTitle::parse(&link.title) {
                Ok(title) => match self.dedup.has_been_seen(&title) {
                    Ok(true) => {
                        summary.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        summary.fail(&link.title, &e.into());
                        continue;
                    }
                },
                Err(e) => {
                    summary.fail(&link.title, &e.into());
                    continue;
                }
            }
            let result = match scraper.fetch_record(&link).await {
                Ok(record) => self.ingest(&record).await,
                Err(e) => Err(e),
            };
            summary.record(&link.title, &result);
        }
        Ok(summary)
    }
}
