use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperflowError, Result};
use crate::models::KEYWORDS_MAX_LEN;

/// Root application configuration, loaded from `~/.config/paperflow/config.toml`.
///
/// Secrets are never stored here; sections name the environment variables
/// that hold them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub paperless: PaperlessConfig,
    pub arxiv: ArxivConfig,
    pub ai: AiConfig,
    pub classification: ClassificationConfig,
    pub scraping: ScrapingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperlessConfig {
    pub base_url: String,
    pub token_env: String,
    /// Minimum spacing between two requests to the Paperless host.
    pub min_interval_ms: u64,
    pub page_size: u32,
    pub task_poll_interval_ms: u64,
    pub task_max_polls: u32,
    /// Poll the consumption task and merge inline instead of waiting for the
    /// post-consume hook.
    pub merge_after_upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub page_size: u32,
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub keywords_max_len: usize,
    pub max_text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Tags the oracle may choose from. Empty means every remote tag.
    pub allowed_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub min_interval_ms: u64,
    pub enabled_sites: Vec<String>,
    pub user_agent: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("paperflow");
        Self {
            database_path: data_dir.join("articles.db").to_string_lossy().to_string(),
        }
    }
}

impl Default for PaperlessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token_env: "PAPERLESS_TOKEN".to_string(),
            min_interval_ms: 3000,
            page_size: 100,
            task_poll_interval_ms: 2000,
            task_max_polls: 30,
            merge_after_upload: false,
        }
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: "https://export.arxiv.org".to_string(),
            min_interval_ms: 3000,
            page_size: 10,
            queries: [
                "quant-ph & cs.CR",
                "math.NT",
                "quant-ph & physics.atom-ph",
                "quant-ph & physics.optics",
                "cs.CR",
                "quant-ph & cond-mat.mes-hall",
                "cs.AR",
                "cs.CR & cs.NI",
                "physics.ed-ph & quant-ph",
                "cs.SE",
                "cs.CR & cs.CC & quant-ph",
                "cs.CR & cs.CY & cs.NI & stat.AP",
                "quant-ph, cs.AI, cs.CR, cs.LG",
                "cs.CR, q-fin.CP",
                "cs.CR, cs.LG, nlin.CD, physics.app-ph, physics.class-ph",
                "QKD, PQC",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            keywords_max_len: KEYWORDS_MAX_LEN,
            max_text_chars: 12_000,
        }
    }
}

pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "Quantum Algorithm",
    "Quantum Key Distribution (QKD)",
    "Regulatory",
    "Standards",
    "Quantum Computing",
    "Quantum Hardware",
    "Quantum Communication",
    "Post Quantum Cryptography (PQC)",
    "Cybersecurity",
    "Cryptography",
    "Quantum Benchmarking",
    "Noisy Intermediate-Scale Quantum (NISQ)",
    "Quantum Error Correction",
    "IBM Qiskit",
    "Google Cirq",
    "Rigetti Forest, Quil",
    "Microsoft Q#, QDK",
    "Xanadu PennyLane",
    "Amazon Braket",
    "D-Wave Ocean SDK",
    "QuTiP",
    "ProjectQ",
    "OpenFermion",
    "Quantum Cloud Computing",
    "Quantum Networking",
    "Quantum AI",
    "Quantum Blockchain",
    "Quantum Ethics",
    "Quantum Supremacy and Advantage",
    "Quantum Programming Languages",
    "Quantum Operating Systems",
];

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            allowed_tags: DEFAULT_ALLOWED_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2000,
            enabled_sites: vec!["quantum-insider".to_string(), "nist".to_string()],
            user_agent: format!("paperflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/paperflow/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PAPERFLOW_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("paperflow")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.paperless.base_url.trim().is_empty(), "paperless.base_url is empty"),
            (self.arxiv.base_url.trim().is_empty(), "arxiv.base_url is empty"),
            (self.ai.base_url.trim().is_empty(), "ai.base_url is empty"),
            (self.paperless.page_size == 0, "paperless.page_size must be positive"),
            (self.arxiv.page_size == 0, "arxiv.page_size must be positive"),
            (self.ai.keywords_max_len == 0, "ai.keywords_max_len must be positive"),
            (self.storage.database_path.trim().is_empty(), "storage.database_path is empty"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(PaperflowError::ConfigError(message.to_string())),
            None => Ok(()),
        }
    }

    // ─── Environment ───────────────────────────────────────

    /// `PAPERLESS_URL` wins over the file value.
    pub fn paperless_base_url(&self) -> String {
        std::env::var("PAPERLESS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.paperless.base_url.clone())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn paperless_token(&self) -> Result<String> {
        read_secret(&self.paperless.token_env)
    }

    pub fn ai_api_key(&self) -> Result<String> {
        read_secret(&self.ai.api_key_env)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }
}

fn read_secret(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| PaperflowError::ConfigError(format!("environment variable {var} is not set")))
}
