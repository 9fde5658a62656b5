use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use paperflow_ai::{Classification, ClassificationOracle, ClassificationRequest};
use paperflow_core::{
    CustomFieldName, CustomFields, Database, DedupEntry, DedupStore, DocumentRecord, NormalizedTitle,
    StorageError, StorageResult,
};

use super::content::{ContentFetcher, PDF_MIME, Payload, safe_file_prefix};
use super::merge::{MergeOptions, MetadataMerger, Reconciler, ResyncOutcome};
use super::pipeline::{IngestOutcome, IngestionPipeline, PipelineOptions};
use crate::arxiv::{ArxivEntry, ArxivSearch, PaperSearch};
use crate::error::{ResolutionError, Result, ScienceError};
use crate::identifiers::ArxivId;
use crate::paperless::fake::FakeStore;
use crate::paperless::{FieldAssignment, VocabularyResolver};

// ─── Fakes ────────────────────────────────────────────────────────────────────

struct FakeOracle {
    answer: Classification,
    requests: Mutex<Vec<ClassificationRequest>>,
}

impl FakeOracle {
    fn answering(tags: &[&str], keywords: &str) -> Self {
        Self {
            answer: Classification {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                keywords: keywords.to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClassificationOracle for FakeOracle {
    async fn classify(&self, request: &ClassificationRequest) -> paperflow_ai::Result<Classification> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.answer.clone())
    }
}

#[derive(Default)]
struct FakeFetcher {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn acquire(&self, record: &DocumentRecord) -> Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScienceError::ContentAcquisition {
                title: record.title().to_string(),
                reason: "connection reset".into(),
            });
        }
        Ok(Payload {
            file_name: format!("{}.pdf", safe_file_prefix(record.title().as_str())),
            mime_type: PDF_MIME.to_string(),
            bytes: b"Quantum key distribution and post-quantum cryptography.".to_vec(),
        })
    }
}

#[derive(Default)]
struct FakeSearch {
    pages: HashMap<(String, u32), Vec<ArxivEntry>>,
    by_id: HashMap<String, ArxivEntry>,
    calls: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl PaperSearch for FakeSearch {
    async fn search(&self, search: &ArxivSearch) -> Result<Vec<ArxivEntry>> {
        self.calls.lock().unwrap().push((search.query.clone(), search.start));
        Ok(self
            .pages
            .get(&(search.query.clone(), search.start))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch(&self, id: &ArxivId) -> Result<Option<ArxivEntry>> {
        Ok(self.by_id.get(&id.id).cloned())
    }
}

/// Fails `has_been_seen` for one title.
struct BrokenDedup {
    inner: Database,
    broken: NormalizedTitle,
}

impl DedupStore for BrokenDedup {
    fn has_been_seen(&self, title: &NormalizedTitle) -> StorageResult<bool> {
        if *title == self.broken {
            return Err(StorageError::Query("disk I/O error".into()));
        }
        self.inner.has_been_seen(title)
    }

    fn record_seen(
        &self,
        title: &NormalizedTitle,
        date: NaiveDate,
        source: &str,
        custom_fields: Option<&CustomFields>,
    ) -> StorageResult<bool> {
        self.inner.record_seen(title, date, source, custom_fields)
    }

    fn mark_synced(&self, title: &NormalizedTitle) -> StorageResult<()> {
        self.inner.mark_synced(title)
    }

    fn load_custom_fields(&self, title: &NormalizedTitle) -> StorageResult<Option<CustomFields>> {
        self.inner.load_custom_fields(title)
    }

    fn update_custom_fields(&self, title: &NormalizedTitle, fields: &CustomFields) -> StorageResult<bool> {
        self.inner.update_custom_fields(title, fields)
    }

    fn fetch_entry(&self, title: &NormalizedTitle) -> StorageResult<Option<DedupEntry>> {
        self.inner.fetch_entry(title)
    }

    fn list_unsynced(&self, limit: usize) -> StorageResult<Vec<DedupEntry>> {
        self.inner.list_unsynced(limit)
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    dedup: Arc<dyn DedupStore>,
    store: Arc<FakeStore>,
    vocabulary: Arc<VocabularyResolver>,
    oracle: Arc<FakeOracle>,
    fetcher: Arc<FakeFetcher>,
    merger: Arc<MetadataMerger>,
}

impl Harness {
    async fn new(oracle: FakeOracle) -> Self {
        Self::with_dedup(Arc::new(Database::open_in_memory().unwrap()), oracle).await
    }

    async fn with_dedup(dedup: Arc<dyn DedupStore>, oracle: FakeOracle) -> Self {
        let store = Arc::new(FakeStore::quantum());
        let vocabulary = Arc::new(VocabularyResolver::new(store.clone()));
        vocabulary.refresh().await.unwrap();
        let oracle = Arc::new(oracle);
        let merger = Arc::new(MetadataMerger::new(
            dedup.clone(),
            store.clone(),
            vocabulary.clone(),
            oracle.clone(),
            MergeOptions {
                allowed_tags: vec!["Quantum Computing".into(), "Cryptography".into()],
                keywords_max_len: 100,
            },
        ));
        Self {
            dedup,
            store,
            vocabulary,
            oracle,
            fetcher: Arc::new(FakeFetcher::default()),
            merger,
        }
    }

    fn pipeline(&self, merge_after_upload: bool) -> IngestionPipeline {
        IngestionPipeline::new(
            self.dedup.clone(),
            self.store.clone(),
            self.vocabulary.clone(),
            self.fetcher.clone(),
            PipelineOptions {
                merge_after_upload,
                task_poll_interval: Duration::from_millis(1),
                task_max_polls: 3,
            },
        )
        .with_merger(self.merger.clone())
    }

    fn entry(&self, title: &str) -> DedupEntry {
        self.dedup
            .fetch_entry(&NormalizedTitle::parse(title).unwrap())
            .unwrap()
            .expect("entry exists")
    }

    fn uploads(&self) -> usize {
        self.store.state().uploads.len()
    }

    fn patches(&self) -> usize {
        self.store.state().patches.len()
    }
}

fn paper(title: &str) -> DocumentRecord {
    DocumentRecord::builder(title)
        .created("2025-05-02")
        .document_type("Scientific-Paper")
        .download_url("https://arxiv.org/pdf/2505.01234v1")
        .source("https://arxiv.org/")
        .build()
        .unwrap()
}

fn arxiv_entry(id: &str, title: &str) -> ArxivEntry {
    let arxiv_id = ArxivId::parse(id).unwrap();
    ArxivEntry {
        pdf_url: arxiv_id.pdf_url(),
        abs_url: arxiv_id.abs_url(),
        arxiv_id,
        title: title.to_string(),
        authors: vec!["Alice Smith".into(), "Bob Lee".into()],
        affiliations: Vec::new(),
        summary: "Abstract.".into(),
        published: Utc.with_ymd_and_hms(2025, 5, 2, 17, 59, 1).unwrap(),
        categories: vec!["quant-ph".into()],
    }
}

// ─── Workflow ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn import_upload_merge_and_rerun() {
    let h = Harness::new(FakeOracle::answering(&["Quantum Computing"], "qkd, pqc")).await;
    let pipeline = h.pipeline(true);

    let outcome = pipeline.ingest(&paper("Title A")).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Synced { document_id: 1 });
    assert_eq!(h.uploads(), 1);

    {
        let state = h.store.state();
        assert_eq!(state.patches.len(), 1);
        let (document_id, patch) = &state.patches[0];
        assert_eq!(*document_id, 1);
        assert_eq!(patch.tags, vec![7]);
        assert!(patch.custom_fields.contains(&FieldAssignment { field: 2, value: json!("qkd, pqc") }));
        assert!(patch.custom_fields.contains(&FieldAssignment { field: 9, value: json!("r4") }));
    }

    let entry = h.entry("Title A");
    assert!(entry.synced);
    assert_eq!(
        entry.custom_fields.unwrap().get_text(CustomFieldName::Keywords),
        Some("qkd, pqc")
    );

    let requests = h.oracle.requests.lock().unwrap();
    let request = &requests[0];
    assert!(request.text.starts_with("Quantum key distribution"));
    assert_eq!(request.allowed_tags, vec!["Quantum Computing", "Cryptography"]);
    drop(requests);

    let rerun = pipeline.ingest(&paper("  Title A ")).await.unwrap();
    assert_eq!(rerun, IngestOutcome::Skipped);
    assert_eq!(h.uploads(), 1);
    assert_eq!(h.patches(), 1);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ingest_time_tags_reach_inline_merges_only() {
    let h = Harness::new(FakeOracle::answering(&["Quantum Computing"], "")).await;
    let tagged = |title: &str| {
        DocumentRecord::builder(title)
            .created("2025-05-02")
            .download_url("https://arxiv.org/pdf/2505.01234v1")
            .tags(["Cryptography"])
            .build()
            .unwrap()
    };

    h.pipeline(true).ingest(&tagged("Title Inline")).await.unwrap();
    h.pipeline(false).ingest(&tagged("Title Deferred")).await.unwrap();
    h.merger.post_consume(2).await.unwrap();

    let state = h.store.state();
    assert_eq!(state.patches[0].1.tags, vec![8, 7]);
    assert_eq!(state.patches[1].0, 2);
    assert_eq!(state.patches[1].1.tags, vec![7]);
}

#[tokio::test]
async fn deferred_merge_through_post_consume() {
    let h = Harness::new(FakeOracle::answering(&["Cryptography"], "lattices")).await;

    let outcome = h.pipeline(false).ingest(&paper("Title B")).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Uploaded { task_id: "task-1".into() });
    assert!(!h.entry("Title B").synced);
    assert_eq!(h.patches(), 0);

    let report = h.merger.post_consume(1).await.unwrap();
    assert!(!report.manual);
    assert_eq!(report.tag_ids, vec![8]);
    assert_eq!(report.keywords.as_deref(), Some("lattices"));
    assert!(h.entry("Title B").synced);
}

#[tokio::test]
async fn oracle_tags_outside_the_allowed_list_block_the_merge() {
    let h = Harness::new(FakeOracle::answering(&["Quantum Computing", "Blockchain"], "qkd")).await;
    h.pipeline(false).ingest(&paper("Title C")).await.unwrap();

    let err = h.merger.post_consume(1).await.unwrap_err();
    match err {
        ScienceError::Resolution(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors.iter().any(|e| *e
                == ResolutionError::UnknownOption {
                    field: "Tags".into(),
                    value: "Blockchain".into(),
                }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.patches(), 0);
    assert!(!h.entry("Title C").synced);
}

#[tokio::test]
async fn failed_patch_stays_unsynced_until_resync() {
    let h = Harness::new(FakeOracle::answering(&["Quantum Computing"], "qkd")).await;
    h.pipeline(false).ingest(&paper("Title D")).await.unwrap();
    h.store.state().fail_patches = true;

    let err = h.merger.post_consume(1).await.unwrap_err();
    assert!(matches!(err, ScienceError::UpdateFailed { document_id: 1, .. }));
    let entry = h.entry("Title D");
    assert!(!entry.synced);
    assert_eq!(entry.custom_fields.unwrap().get_text(CustomFieldName::Keywords), None);

    h.store.state().fail_patches = false;
    let reconciler = Reconciler::new(h.dedup.clone(), h.store.clone(), h.merger.clone());
    let report = reconciler.run(10).await.unwrap();
    assert_eq!(report.entries, vec![("Title D".to_string(), ResyncOutcome::Synced { document_id: 1 })]);
    assert!(h.entry("Title D").synced);
    assert!(h.dedup.list_unsynced(10).unwrap().is_empty());
}

#[tokio::test]
async fn resync_reports_documents_not_yet_in_paperless() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let record = paper("Title E");
    h.dedup
        .record_seen(record.title(), record.created(), record.source(), Some(&record.custom_fields(false)))
        .unwrap();

    let reconciler = Reconciler::new(h.dedup.clone(), h.store.clone(), h.merger.clone());
    let report = reconciler.run(10).await.unwrap();
    assert_eq!(report.pending(), 1);
    assert_eq!(report.synced(), 0);
}

#[tokio::test]
async fn manual_documents_are_recorded_and_merged() {
    let h = Harness::new(FakeOracle::answering(&["Cryptography"], "pqc")).await;
    let id = h.store.insert_document("Hand Scanned Notes", "2024-11-05", "Notes on ML-KEM.");

    let report = h.merger.post_consume(id).await.unwrap();
    assert!(report.manual);

    let entry = h.entry("Hand Scanned Notes");
    assert_eq!(entry.source, "Manual");
    assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 11, 5).unwrap());
    assert!(entry.synced);

    let skipped = h.pipeline(false).ingest(&paper("Hand Scanned Notes")).await.unwrap();
    assert_eq!(skipped, IngestOutcome::Skipped);
}

// ─── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn storage_errors_fail_one_item_only() {
    let dedup = Arc::new(BrokenDedup {
        inner: Database::open_in_memory().unwrap(),
        broken: NormalizedTitle::parse("Broken Paper").unwrap(),
    });
    let h = Harness::with_dedup(dedup, FakeOracle::answering(&[], "")).await;

    let summary = h
        .pipeline(false)
        .ingest_all(vec![paper("Broken Paper"), paper("Title F")])
        .await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failures[0].title, "Broken Paper");
    assert!(summary.failures[0].error.contains("disk I/O error"));
    assert_eq!(h.uploads(), 1);
}

#[tokio::test]
async fn failed_download_can_be_retried() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let pipeline = h.pipeline(false);
    let record = paper("Title Retry");
    h.fetcher.fail.store(true, Ordering::SeqCst);

    let err = pipeline.ingest(&record).await.unwrap_err();
    assert!(matches!(err, ScienceError::ContentAcquisition { .. }));
    assert_eq!(h.uploads(), 0);
    assert!(!h.dedup.has_been_seen(record.title()).unwrap());

    h.fetcher.fail.store(false, Ordering::SeqCst);
    let outcome = pipeline.ingest(&record).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Uploaded { task_id: "task-1".into() });
    assert_eq!(h.uploads(), 1);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    assert!(h.dedup.has_been_seen(record.title()).unwrap());
}

#[tokio::test]
async fn unknown_document_type_is_rejected_before_admission() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let record = DocumentRecord::builder("Title H")
        .created("2025-05-02")
        .document_type("Patent")
        .content("text")
        .build()
        .unwrap();

    let err = h.pipeline(false).ingest(&record).await.unwrap_err();
    assert!(matches!(err, ScienceError::Resolution(_)));
    assert!(!h.dedup.has_been_seen(record.title()).unwrap());
}

#[tokio::test]
async fn stop_flag_prevents_new_items() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let pipeline = h.pipeline(false);
    pipeline.stop_flag().store(true, Ordering::SeqCst);

    let summary = pipeline.ingest_all(vec![paper("Title I")]).await;
    assert!(summary.stopped);
    assert_eq!(summary.total(), 0);
    assert_eq!(h.uploads(), 0);
}

// ─── arXiv entry points ───────────────────────────────────────────────────────

#[tokio::test]
async fn import_by_id_rejects_search_inputs() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let mut search = FakeSearch::default();
    search
        .by_id
        .insert("2505.01234".into(), arxiv_entry("2505.01234v1", "Finite-Key Security"));

    let inputs = vec![
        "arXiv:2505.01234".to_string(),
        "quantum error correction".to_string(),
        "2501.99999".to_string(),
    ];
    let summary = h.pipeline(false).import_ids(&search, &inputs).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert!(summary.failures[0].error.contains("search query"));
    assert_eq!(summary.failures[1].title, "2501.99999");

    let state = h.store.state();
    let upload = &state.uploads[0];
    assert_eq!(upload.title, "Finite-Key Security");
    assert_eq!(upload.created, "2025-05-02");
    assert_eq!(upload.document_type, Some(1));
}

#[tokio::test]
async fn automate_pages_until_empty_and_never_resends() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let mut search = FakeSearch::default();
    search.pages.insert(
        ("QKD".into(), 0),
        vec![arxiv_entry("2505.00001", "Paper One"), arxiv_entry("2505.00002", "Paper Two")],
    );
    search
        .pages
        .insert(("QKD".into(), 2), vec![arxiv_entry("2505.00003", "Paper Three")]);
    search
        .pages
        .insert(("PQC".into(), 0), vec![arxiv_entry("2505.00001", "Paper One")]);

    let queries = vec!["QKD".to_string(), "PQC".to_string()];
    let summary = h.pipeline(false).automate(&search, &queries, 2, None).await;

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(h.uploads(), 3);
    assert_eq!(
        *search.calls.lock().unwrap(),
        vec![
            ("QKD".to_string(), 0),
            ("QKD".to_string(), 2),
            ("QKD".to_string(), 4),
            ("PQC".to_string(), 0),
            ("PQC".to_string(), 2),
        ]
    );

    let entry = h.entry("Paper One");
    assert_eq!(entry.source, "https://arxiv.org/");
    assert_eq!(
        entry.custom_fields.unwrap().get_text(CustomFieldName::ImportQuery),
        Some("QKD")
    );
}

#[tokio::test]
async fn automate_respects_max_pages() {
    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    let mut search = FakeSearch::default();
    search
        .pages
        .insert(("QKD".into(), 0), vec![arxiv_entry("2505.00001", "Paper One")]);
    search
        .pages
        .insert(("QKD".into(), 1), vec![arxiv_entry("2505.00002", "Paper Two")]);

    let summary = h
        .pipeline(false)
        .automate(&search, &["QKD".to_string()], 1, Some(1))
        .await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(search.calls.lock().unwrap().len(), 1);
}

// ─── Scraping ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scrape_skips_known_titles_before_fetching() {
    use crate::http::{HostThrottle, RateLimitedClient};
    use crate::sources::{QuantumInsiderSource, SiteScraper};

    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let listing = format!(
        r#"<html><body>
        <article><h6 class="elementor-post__title"><a href="{base}/known">Known Story</a></h6>
        <span class="elementor-post-date">May 1, 2025</span></article>
        <article><h6 class="elementor-post__title"><a href="{base}/fresh">Fresh Story</a></h6>
        <span class="elementor-post-date">May 2, 2025</span></article>
        </body></html>"#
    );
    server.mock("GET", "/category/daily").with_body(listing).create_async().await;
    let known = server.mock("GET", "/known").expect(0).create_async().await;
    server
        .mock("GET", "/fresh")
        .with_body(include_str!("../sources/fixtures/quantum_insider_article.html"))
        .create_async()
        .await;

    let h = Harness::new(FakeOracle::answering(&[], "")).await;
    h.dedup
        .record_seen(
            &NormalizedTitle::parse("Known Story").unwrap(),
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            "Not-Specified",
            None,
        )
        .unwrap();

    let client = RateLimitedClient::new(HostThrottle::new(), Duration::ZERO, 0, "paperflow-test").unwrap();
    let scraper = SiteScraper::new(client, Box::new(QuantumInsiderSource::with_base_url(&base)));
    let summary = h.pipeline(false).scrape(&scraper).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    known.assert_async().await;

    let state = h.store.state();
    let upload = &state.uploads[0];
    assert_eq!(upload.title, "Fresh Story");
    assert_eq!(upload.document_type, Some(2));
}
