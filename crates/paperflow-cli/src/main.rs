use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use paperflow_ai::{OpenAiConfig, OpenAiOracle};
use paperflow_core::{AppConfig, Database, DedupStore, ExitCode, NormalizedTitle};
use paperflow_science::ScienceError;
use paperflow_science::arxiv::ArxivClient;
use paperflow_science::enrichment::{
    BatchSummary, HttpContentFetcher, IngestionPipeline, MergeOptions, MetadataMerger, PipelineOptions, Reconciler,
};
use paperflow_science::http::{HostThrottle, RateLimitedClient};
use paperflow_science::paperless::{PaperlessClient, VocabularyResolver};
use paperflow_science::sources::{SiteScraper, adapter_for, available_sites};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "paperflow",
    about = "Feed arXiv papers and scraped articles into Paperless-ngx",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    /// Also enabled by setting PAPERFLOW_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.config/paperflow/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import arXiv papers by ID or abs/pdf URL.
    Import {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Wait for consumption and merge metadata right away.
        #[arg(long)]
        merge: bool,
    },

    /// Import one page of arXiv search results.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        max_results: u32,
        #[arg(long)]
        merge: bool,
    },

    /// Page through arXiv queries until they run dry.
    Automate {
        /// Query to run; repeatable. Defaults to arxiv.queries.
        #[arg(long = "query", action = clap::ArgAction::Append)]
        queries: Vec<String>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long)]
        merge: bool,
    },

    /// Scrape news and publication sites.
    Scrape {
        /// Sites to scrape. Defaults to scraping.enabled_sites.
        sites: Vec<String>,
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long)]
        merge: bool,
    },

    /// Merge metadata into a consumed document.
    /// Paperless post-consume scripts pass DOCUMENT_ID.
    PostConsume {
        document_id: Option<u64>,
    },

    /// Retry the merge for entries not yet synced.
    Resync {
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Show the Paperless vocabulary.
    Vocab,

    /// Show the dedup entry for a title, or store totals.
    Status { title: Option<String> },

    /// Drop a title from the dedup store so the next run ingests it again.
    Forget {
        title: String,
        #[arg(long)]
        confirm: bool,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Get a specific config key.
    Get { key: String },
    /// Write the default config file if none exists.
    Init,
    /// Print the config file path.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json_output = cli.json || std::env::var("PAPERFLOW_JSON").as_deref() == Ok("1");
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_from(&config_path)?;
    config.validate()?;

    match cli.command {
        // ── arXiv ──────────────────────────────────────────────────────────

        Commands::Import { ids, merge } => {
            let services = Services::connect(config).await?;
            let pipeline = services.pipeline(merge)?;
            let arxiv = services.arxiv()?;
            let summary = pipeline.import_ids(&arxiv, &ids).await;
            report_batch(json_output, start, &summary)?;
        }

        Commands::Search { query, max_results, merge } => {
            let services = Services::connect(config).await?;
            let pipeline = services.pipeline(merge)?;
            let arxiv = services.arxiv()?;
            let summary = pipeline.search(&arxiv, &query, max_results).await?;
            report_batch(json_output, start, &summary)?;
        }

        Commands::Automate { queries, page_size, max_pages, merge } => {
            let queries = if queries.is_empty() { config.arxiv.queries.clone() } else { queries };
            if queries.is_empty() {
                eprintln!("No queries given and arxiv.queries is empty.");
                std::process::exit(ExitCode::InvalidArgs as i32);
            }
            let page_size = page_size.unwrap_or(config.arxiv.page_size);
            let services = Services::connect(config).await?;
            let pipeline = services.pipeline(merge)?;
            let arxiv = services.arxiv()?;
            let summary = pipeline.automate(&arxiv, &queries, page_size, max_pages).await;
            tracing::info!(imported = summary.succeeded, "automation finished");
            report_batch(json_output, start, &summary)?;
        }

        // ── Scraping ───────────────────────────────────────────────────────

        Commands::Scrape { sites, max_pages, merge } => {
            let sites = if sites.is_empty() { config.scraping.enabled_sites.clone() } else { sites };
            let services = Services::connect(config).await?;
            let pipeline = services.pipeline(merge)?;

            let mut summary = BatchSummary::default();
            for site in &sites {
                if summary.stopped {
                    break;
                }
                let Some(adapter) = adapter_for(site) else {
                    let known = available_sites().join(", ");
                    summary.fail(site, &ScienceError::Config(format!("unknown site '{site}' (known: {known})")));
                    continue;
                };
                let scraper = SiteScraper::new(services.scraping_client()?, adapter).with_max_pages(max_pages);
                match pipeline.scrape(&scraper).await {
                    Ok(site_summary) => summary.absorb(site_summary),
                    Err(e) => summary.fail(site, &e),
                }
            }
            report_batch(json_output, start, &summary)?;
        }

        // ── Merge ──────────────────────────────────────────────────────────

        Commands::PostConsume { document_id } => {
            let document_id = match document_id.or_else(env_document_id) {
                Some(id) => id,
                None => {
                    eprintln!("No document ID given and DOCUMENT_ID is not set.");
                    std::process::exit(ExitCode::InvalidArgs as i32);
                }
            };
            let services = Services::connect(config).await?;
            let merger = services.merger()?;
            let report = match merger.post_consume(document_id).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(document_id, error = %e, "post-consume merge failed");
                    if json_output {
                        print_json(&serde_json::json!({"status":"error","error":error_kind(&e),"message":e.to_string(),"meta":{"duration_ms":start.elapsed().as_millis()}}))?;
                    } else {
                        eprintln!("Merge failed for document {document_id}: {e}");
                    }
                    std::process::exit(exit_code(&e) as i32);
                }
            };
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                let origin = if report.manual { " (manual)" } else { "" };
                println!("Merged document {}: {}{origin}", report.document_id, report.title);
                println!("  Tags:     {}", report.tags.join(", "));
                println!("  Keywords: {}", report.keywords.as_deref().unwrap_or("-"));
                println!("  Fields:   {}", report.fields_written);
            }
        }

        Commands::Resync { limit } => {
            let services = Services::connect(config).await?;
            let merger = Arc::new(services.merger()?);
            let reconciler = Reconciler::new(services.dedup.clone(), services.store.clone(), merger);
            let report = reconciler.run(limit).await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "synced": report.synced(),
                        "pending": report.pending(),
                        "failed": report.failed(),
                        "entries": report.entries,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if report.entries.is_empty() {
                println!("Nothing to resync.");
            } else {
                for (title, outcome) in &report.entries {
                    println!("  {title:<60}  {outcome:?}");
                }
                println!(
                    "Synced {}, pending {}, failed {}",
                    report.synced(),
                    report.pending(),
                    report.failed()
                );
            }
            if report.failed() > 0 {
                std::process::exit(ExitCode::PartialFailure as i32);
            }
        }

        // ── Inspection ─────────────────────────────────────────────────────

        Commands::Vocab => {
            let services = Services::connect(config).await?;
            let vocabulary = services.vocabulary.snapshot();
            let dur = start.elapsed().as_millis();

            if json_output {
                let fields: Vec<serde_json::Value> = vocabulary
                    .custom_fields()
                    .iter()
                    .map(|f| {
                        let options: Vec<serde_json::Value> = f
                            .options
                            .iter()
                            .map(|o| serde_json::json!({"id":o.id.to_json(),"label":o.label}))
                            .collect();
                        serde_json::json!({"id":f.id,"name":f.name,"data_type":f.data_type.to_string(),"options":options})
                    })
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "tags": vocabulary.tags(),
                        "document_types": vocabulary.document_types(),
                        "custom_fields": fields,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Tags:");
                for (name, id) in vocabulary.tags() {
                    println!("  {id:>5}  {name}");
                }
                println!("Document types:");
                for (name, id) in vocabulary.document_types() {
                    println!("  {id:>5}  {name}");
                }
                println!("Custom fields:");
                for field in vocabulary.custom_fields() {
                    println!("  {:>5}  {:<28} {}", field.id, field.name, field.data_type);
                    for option in &field.options {
                        println!("         - {} ({})", option.label, option.id);
                    }
                }
            }
        }

        Commands::Status { title } => {
            let db = open_db(&config)?;
            match title {
                Some(raw) => {
                    let title = NormalizedTitle::parse(&raw)?;
                    let entry = db.fetch_entry(&title)?;
                    let dur = start.elapsed().as_millis();
                    match entry {
                        Some(entry) => {
                            if json_output {
                                print_json(&serde_json::json!({"status":"ok","data":entry,"meta":{"duration_ms":dur}}))?;
                            } else {
                                println!("Title:   {}", entry.title);
                                println!("Date:    {}", entry.date_iso());
                                println!("Source:  {}", entry.source);
                                println!("Synced:  {}", if entry.synced { "yes" } else { "no" });
                                if let Some(fields) = &entry.custom_fields {
                                    for (name, value) in fields.entries() {
                                        println!("  {name:<24}: {value}");
                                    }
                                }
                            }
                        }
                        None => {
                            if json_output {
                                print_json(&serde_json::json!({"status":"error","error":"not_found","message":format!("'{title}' has not been seen"),"meta":{"duration_ms":dur}}))?;
                            } else {
                                eprintln!("Not seen: {title}");
                            }
                            std::process::exit(ExitCode::NotFound as i32);
                        }
                    }
                }
                None => {
                    let counts = db.counts()?;
                    let dur = start.elapsed().as_millis();
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": {"total": counts.total, "synced": counts.synced, "unsynced": counts.unsynced()},
                            "meta": {"duration_ms": dur}
                        }))?;
                    } else {
                        println!("Dedup store: {}", db.path().unwrap_or(":memory:"));
                        println!("  Seen titles: {}", counts.total);
                        println!("  Synced:      {}", counts.synced);
                        println!("  Unsynced:    {}", counts.unsynced());
                    }
                }
            }
        }

        Commands::Forget { title, confirm } => {
            if !confirm {
                eprintln!("Add --confirm to drop the dedup entry.");
                std::process::exit(ExitCode::InvalidArgs as i32);
            }
            let title = NormalizedTitle::parse(&title)?;
            let db = open_db(&config)?;
            let removed = db.forget(&title)?;
            let dur = start.elapsed().as_millis();
            if !removed {
                if json_output {
                    print_json(&serde_json::json!({"status":"error","error":"not_found","message":format!("'{title}' has not been seen"),"meta":{"duration_ms":dur}}))?;
                } else {
                    eprintln!("Not seen: {title}");
                }
                std::process::exit(ExitCode::NotFound as i32);
            }
            tracing::info!(%title, "dedup entry removed");
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"forgotten":title.as_str()},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("Forgot: {title}");
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":kv,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Get { key } => {
                    let kv = config_key_values(&config);
                    match kv.get(key.as_str()) {
                        Some(val) => {
                            if json_output {
                                print_json(&serde_json::json!({"status":"ok","data":{"key":key,"value":val},"meta":{"duration_ms":dur}}))?;
                            } else {
                                println!("{val}");
                            }
                        }
                        None => {
                            eprintln!("Unknown config key: {key}");
                            std::process::exit(ExitCode::NotFound as i32);
                        }
                    }
                }
                ConfigAction::Init => {
                    if config_path.exists() {
                        println!("Config already exists: {}", config_path.display());
                    } else {
                        AppConfig::default().save_to(&config_path)?;
                        println!("Wrote default config: {}", config_path.display());
                    }
                }
                ConfigAction::Path => println!("{}", config_path.display()),
            }
        }
    }

    Ok(())
}

// ─── Services ────────────────────────────────────────────────────────────────

/// Clients shared by one command. Every HTTP client shares the same
/// per-host throttle.
struct Services {
    config: AppConfig,
    throttle: HostThrottle,
    dedup: Arc<Database>,
    store: Arc<PaperlessClient>,
    vocabulary: Arc<VocabularyResolver>,
}

impl Services {
    async fn connect(config: AppConfig) -> Result<Self> {
        let throttle = HostThrottle::new();
        let dedup = Arc::new(open_db(&config)?);
        let token = config.paperless_token()?;
        let base_url = config.paperless_base_url();
        let store = Arc::new(PaperlessClient::new(
            &config.paperless,
            &base_url,
            &token,
            throttle.clone(),
            &config.scraping.user_agent,
        )?);
        let vocabulary = Arc::new(VocabularyResolver::new(store.clone()));
        vocabulary
            .refresh()
            .await
            .with_context(|| format!("loading vocabulary from {base_url}"))?;
        Ok(Self {
            config,
            throttle,
            dedup,
            store,
            vocabulary,
        })
    }

    fn arxiv(&self) -> Result<ArxivClient> {
        Ok(ArxivClient::new(&self.config.arxiv, self.throttle.clone(), &self.config.scraping.user_agent)?)
    }

    fn scraping_client(&self) -> Result<RateLimitedClient> {
        Ok(RateLimitedClient::new(
            self.throttle.clone(),
            Duration::from_millis(self.config.scraping.min_interval_ms),
            3,
            &self.config.scraping.user_agent,
        )?)
    }

    fn merger(&self) -> Result<MetadataMerger> {
        let key = self.config.ai_api_key()?;
        let oracle = OpenAiOracle::new(OpenAiConfig::from_app_config(&self.config.ai, key))?;
        tracing::debug!(model = oracle.model_name(), "classification oracle ready");
        Ok(MetadataMerger::new(
            self.dedup.clone(),
            self.store.clone(),
            self.vocabulary.clone(),
            Arc::new(oracle),
            MergeOptions {
                allowed_tags: self.config.classification.allowed_tags.clone(),
                keywords_max_len: self.config.ai.keywords_max_len,
            },
        ))
    }

    /// Ingestion pipeline whose stop flag is raised on Ctrl-C.
    fn pipeline(&self, merge: bool) -> Result<IngestionPipeline> {
        let paperless = &self.config.paperless;
        let options = PipelineOptions {
            merge_after_upload: merge || paperless.merge_after_upload,
            task_poll_interval: Duration::from_millis(paperless.task_poll_interval_ms),
            task_max_polls: paperless.task_max_polls,
        };
        let fetcher = Arc::new(HttpContentFetcher::new(self.scraping_client()?));
        let merge_inline = options.merge_after_upload;
        let mut pipeline = IngestionPipeline::new(
            self.dedup.clone(),
            self.store.clone(),
            self.vocabulary.clone(),
            fetcher,
            options,
        );
        if merge_inline {
            pipeline = pipeline.with_merger(Arc::new(self.merger()?));
        }
        stop_on_interrupt(pipeline.stop_flag());
        Ok(pipeline)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr).compact();
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

fn stop_on_interrupt(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing the current document");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

fn env_document_id() -> Option<u64> {
    std::env::var("DOCUMENT_ID").ok().and_then(|id| id.trim().parse().ok())
}

fn report_batch(json_output: bool, start: Instant, summary: &BatchSummary) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        print_json(&serde_json::json!({"status":"ok","data":summary,"meta":{"duration_ms":dur}}))?;
    } else {
        println!(
            "Imported {}, skipped {}, failed {}{}",
            summary.succeeded,
            summary.skipped,
            summary.failed,
            if summary.stopped { " (interrupted)" } else { "" }
        );
        for failure in &summary.failures {
            println!("  ✗ {}: {}", failure.title, failure.error);
        }
    }
    if summary.failed > 0 {
        std::process::exit(ExitCode::PartialFailure as i32);
    }
    Ok(())
}

fn error_kind(error: &ScienceError) -> &'static str {
    match error {
        ScienceError::DocumentNotFound(_) => "not_found",
        ScienceError::Resolution(_) => "resolution",
        ScienceError::UpdateFailed { .. } => "update_failed",
        ScienceError::Ai(_) => "classification",
        ScienceError::Storage(_) => "storage",
        _ => "error",
    }
}

fn exit_code(error: &ScienceError) -> ExitCode {
    match error {
        ScienceError::DocumentNotFound(_) => ExitCode::NotFound,
        ScienceError::Ai(_) => ExitCode::AiError,
        ScienceError::Storage(_) => ExitCode::StorageError,
        ScienceError::Http(_) | ScienceError::RateLimit(..) | ScienceError::ApiError(..) => ExitCode::NetworkError,
        _ => ExitCode::GeneralError,
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&db_path)?)
}

fn config_key_values(config: &AppConfig) -> std::collections::BTreeMap<&'static str, String> {
    let mut map = std::collections::BTreeMap::new();
    map.insert("storage.database_path", config.database_path().to_string_lossy().to_string());
    map.insert("paperless.base_url", config.paperless_base_url());
    map.insert("paperless.token_env", config.paperless.token_env.clone());
    map.insert("paperless.merge_after_upload", config.paperless.merge_after_upload.to_string());
    map.insert("arxiv.base_url", config.arxiv.base_url.clone());
    map.insert("arxiv.page_size", config.arxiv.page_size.to_string());
    map.insert("arxiv.queries", config.arxiv.queries.join(" | "));
    map.insert("ai.base_url", config.ai.base_url.clone());
    map.insert("ai.model", config.ai.model.clone());
    map.insert("ai.api_key_env", config.ai.api_key_env.clone());
    map.insert("classification.allowed_tags", config.classification.allowed_tags.join(", "));
    map.insert("scraping.enabled_sites", config.scraping.enabled_sites.join(", "));
    map
}
