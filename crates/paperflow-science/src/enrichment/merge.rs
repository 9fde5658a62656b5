use std::sync::Arc;

use serde::Serialize;

use paperflow_ai::{ClassificationOracle, ClassificationRequest};
use paperflow_core::{AddedVia, DedupStore, DocumentRecord, KEYWORDS_MAX_LEN, NormalizedTitle, parse_date};

use crate::error::{ResolutionError, ResolutionErrors, Result, ScienceError};
use crate::paperless::{DocumentStore, MetadataPatch, RemoteDocument, VocabularyResolver};

pub const MANUAL_SOURCE: &str = "Manual";
const TAGS_FIELD: &str = "Tags";

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Tags offered to the oracle. Empty means every remote tag.
    pub allowed_tags: Vec<String>,
    pub keywords_max_len: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            allowed_tags: Vec::new(),
            keywords_max_len: KEYWORDS_MAX_LEN,
        }
    }
}

/// What one merge wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub document_id: u64,
    pub title: String,
    pub manual: bool,
    pub tags: Vec<String>,
    pub tag_ids: Vec<u64>,
    pub keywords: Option<String>,
    pub fields_written: usize,
}

/// Classifies an uploaded document and writes its metadata back in one
/// PATCH.
///
/// The dedup entry is marked synced only after the PATCH succeeds; a failed
/// PATCH leaves it unsynced for the next reconciliation pass.
pub struct MetadataMerger {
    dedup: Arc<dyn DedupStore>,
    store: Arc<dyn DocumentStore>,
    vocabulary: Arc<VocabularyResolver>,
    oracle: Arc<dyn ClassificationOracle>,
    options: MergeOptions,
}

impl MetadataMerger {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        store: Arc<dyn DocumentStore>,
        vocabulary: Arc<VocabularyResolver>,
        oracle: Arc<dyn ClassificationOracle>,
        options: MergeOptions,
    ) -> Self {
        Self {
            dedup,
            store,
            vocabulary,
            oracle,
            options,
        }
    }

    /// Entry point of the post-consume hook.
    ///
    /// Documents with no dedup entry were added by hand; they get a manual
    /// record and are recorded as seen so automated runs skip them.
    pub async fn post_consume(&self, document_id: u64) -> Result<MergeReport> {
        let document = self.store.get_document(document_id).await?;
        let title = NormalizedTitle::parse(&document.title)?;

        let (record, manual) = match self.dedup.fetch_entry(&title)? {
            Some(entry) => (DocumentRecord::from_entry(&entry), false),
            None => {
                tracing::info!(%title, document_id, "no dedup entry, treating as manual upload");
                let record = manual_record(&document)?;
                self.dedup.record_seen(
                    record.title(),
                    record.created(),
                    MANUAL_SOURCE,
                    Some(&record.custom_fields(false)),
                )?;
                (record, true)
            }
        };

        let mut report = self.merge(&document, record).await?;
        report.manual = manual;
        Ok(report)
    }

    /// Classifies `document`, resolves every field and tag, patches, then
    /// stores the new snapshot and marks the entry synced.
    pub async fn merge(&self, document: &RemoteDocument, mut record: DocumentRecord) -> Result<MergeReport> {
        let allowed = self.allowed_tags();
        let request = ClassificationRequest::new(document.content.clone(), allowed.clone());
        let classification = self.oracle.classify(&request).await?;

        let mut errors = ResolutionErrors::default();
        let (accepted, rejected) = classification.partition_tags(&allowed);
        for tag in rejected {
            tracing::warn!(title = %record.title(), %tag, "oracle returned a tag outside the allowed list");
            errors.push(ResolutionError::UnknownOption {
                field: TAGS_FIELD.to_string(),
                value: tag,
            });
        }

        record.merge_tags(accepted);
        record.merge_keywords(&classification.keywords, self.options.keywords_max_len);

        let fields = record.custom_fields(false);
        let assignments = match self.vocabulary.resolve_custom_fields(&fields) {
            Ok(assignments) => assignments,
            Err(e) => {
                errors.extend(e);
                Vec::new()
            }
        };
        let (tag_ids, unknown_tags) = self.vocabulary.resolve_tag_names(&record.tags);
        for tag in unknown_tags {
            errors.push(ResolutionError::UnknownTag(tag));
        }
        if !errors.is_empty() {
            return Err(ScienceError::Resolution(errors));
        }

        // PATCH replaces the tag list, so keep what the document already has.
        let mut tags = document.tags.clone();
        for id in &tag_ids {
            if !tags.contains(id) {
                tags.push(*id);
            }
        }
        let patch = MetadataPatch {
            custom_fields: assignments,
            tags,
        };
        self.store
            .patch_document(document.id, &patch)
            .await
            .map_err(|e| match e {
                ScienceError::UpdateFailed { .. } => e,
                other => ScienceError::UpdateFailed {
                    document_id: document.id,
                    reason: other.to_string(),
                },
            })?;

        self.dedup.update_custom_fields(record.title(), &fields)?;
        self.dedup.mark_synced(record.title())?;
        tracing::info!(
            title = %record.title(),
            document_id = document.id,
            tags = tag_ids.len(),
            "metadata merged"
        );

        Ok(MergeReport {
            document_id: document.id,
            title: record.title().to_string(),
            manual: false,
            tags: record.tags.clone(),
            tag_ids,
            keywords: record.keywords().map(str::to_string),
            fields_written: patch.custom_fields.len(),
        })
    }

    fn allowed_tags(&self) -> Vec<String> {
        if self.options.allowed_tags.is_empty() {
            self.vocabulary.snapshot().tag_names()
        } else {
            self.options.allowed_tags.clone()
        }
    }
}

fn manual_record(document: &RemoteDocument) -> Result<DocumentRecord> {
    let raw = document.created_raw().unwrap_or_default();
    let created = parse_date(raw)?;
    Ok(DocumentRecord::builder(&document.title)
        .created_on(created)
        .added_via(AddedVia::Manual)
        .source(MANUAL_SOURCE)
        .build()?)
}

// ─── Reconciliation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResyncOutcome {
    Synced { document_id: u64 },
    /// Paperless has no document with this title yet.
    Pending,
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
    pub entries: Vec<(String, ResyncOutcome)>,
}

impl ResyncReport {
    pub fn count(&self, pred: impl Fn(&ResyncOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, ResyncOutcome::Synced { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, ResyncOutcome::Pending))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ResyncOutcome::Failed { .. }))
    }
}

/// Reruns the merge for entries whose metadata never reached Paperless.
pub struct Reconciler {
    dedup: Arc<dyn DedupStore>,
    store: Arc<dyn DocumentStore>,
    merger: Arc<MetadataMerger>,
}

impl Reconciler {
    pub fn new(dedup: Arc<dyn DedupStore>, store: Arc<dyn DocumentStore>, merger: Arc<MetadataMerger>) -> Self {
        Self { dedup, store, merger }
    }

    pub async fn run(&self, limit: usize) -> Result<ResyncReport> {
        let mut report = ResyncReport::default();
        for entry in self.dedup.list_unsynced(limit)? {
            let title = entry.title.to_string();
            let outcome = match self.resync_entry(&entry.title).await {
                Ok(Some(document_id)) => ResyncOutcome::Synced { document_id },
                Ok(None) => ResyncOutcome::Pending,
                Err(e) => {
                    tracing::error!(%title, error = %e, "resync failed");
                    ResyncOutcome::Failed { reason: e.to_string() }
                }
            };
            report.entries.push((title, outcome));
        }
        Ok(report)
    }

    async fn resync_entry(&self, title: &NormalizedTitle) -> Result<Option<u64>> {
        let candidates = self.store.find_documents_by_title(title.as_str()).await?;
        let Some(summary) = candidates
            .into_iter()
            .find(|d| NormalizedTitle::parse(&d.title).is_ok_and(|t| &t == title))
        else {
            return Ok(None);
        };

        // List results may omit content.
        let document = self.store.get_document(summary.id).await?;
        let Some(entry) = self.dedup.fetch_entry(title)? else {
            return Ok(None);
        };
        self.merger.merge(&document, DocumentRecord::from_entry(&entry)).await?;
        Ok(Some(document.id))
    }
}
