//! Run configuration for putusan-dl
//!
//! Every section has defaults, so a partial TOML file (or none at all) is a
//! valid configuration. CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Listing URL of the Supreme Court legal-product index; the page number is appended.
pub const DEFAULT_BASE_URL: &str = "https://jdih.mahkamahagung.go.id/dokumen-hukum/putusan?page=";

/// Detail anchor on a listing page: capture 1 is the href, capture 2 the heading label.
pub const DEFAULT_LINK_PATTERN: &str = r#"<a class="d-inline-block" href="(https://jdih\.mahkamahagung\.go\.id/legal-product/[^"]+/detail)">\s*<h2>(.*?)</h2>"#;

/// First PDF URL embedded in a detail page.
pub const DEFAULT_FILE_PATTERN: &str = r#"https://[^\s"'<>]*?\.pdf"#;

/// Media types accepted into storage.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpg",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/svg+xml",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// Certificate verification mode for outgoing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Verify certificates (default)
    #[default]
    Strict,
    /// Accept invalid or self-signed certificates; the court mirrors need this
    Relaxed,
}

/// Where accepted payloads are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Google Cloud Storage bucket
    #[default]
    Gcs,
    /// Local directory tree
    Filesystem,
    /// Process memory only (dry runs, tests)
    Memory,
}

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub fetch: FetchConfig,
    pub gate: GateConfig,
    pub storage: StorageConfig,
    pub staging: StagingConfig,
}

/// Pagination and extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Listing URL prefix; the page ordinal is appended verbatim
    pub base_url: String,
    /// First page to crawl (1-based)
    pub start_page: u32,
    /// Inclusive safety cap; pagination also stops at the first empty page
    pub end_page: Option<u32>,
    /// Detail-link regex: capture 1 = href, optional capture 2 = label
    pub link_pattern: String,
    /// File-URL regex matched against detail pages
    pub file_pattern: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            start_page: 1,
            end_page: None,
            link_pattern: DEFAULT_LINK_PATTERN.to_string(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub tls: TlsMode,
    /// Overall per-request timeout; `None` disables it
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::Strict,
            timeout_secs: Some(60),
            connect_timeout_secs: 10,
            user_agent: format!("putusan-dl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Type/size gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub allowed_types: Vec<String>,
    /// Maximum payload size in bytes; disabled when absent
    pub max_size: Option<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_size: None,
        }
    }
}

/// Storage sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key prefix for every stored object
    pub namespace: String,
    /// GCS bucket name
    pub bucket: Option<String>,
    /// File holding a GCS OAuth access token; `GCS_ACCESS_TOKEN` is used otherwise
    pub credential: Option<PathBuf>,
    /// GCS API endpoint
    pub endpoint: String,
    /// Root directory of the filesystem backend
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            namespace: "yurisprudensi".to_string(),
            bucket: None,
            credential: None,
            endpoint: "https://storage.googleapis.com".to_string(),
            root: PathBuf::from("objects"),
        }
    }
}

/// Local staging of downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: PathBuf,
    /// Keep a local copy of every download as `{dir}/{filename}`
    pub keep: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("staging"),
            keep: false,
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field constraints before the run starts
    pub fn validate(&self) -> Result<()> {
        let crawl = &self.crawl;
        if crawl.start_page == 0 {
            return Err(Error::Config("start_page must be at least 1".to_string()));
        }
        if let Some(end) = crawl.end_page {
            if end < crawl.start_page {
                return Err(Error::Config(format!(
                    "end_page ({end}) is before start_page ({})",
                    crawl.start_page
                )));
            }
        }
        if crawl.base_url.trim().is_empty() {
            return Err(Error::Config("base_url is empty".to_string()));
        }
        if self.gate.allowed_types.is_empty() {
            return Err(Error::Config("allowed_types is empty".to_string()));
        }
        if self.storage.backend == StorageBackend::Gcs && self.storage.bucket.is_none() {
            return Err(Error::Config("gcs backend requires a bucket".to_string()));
        }
        Ok(())
    }
}
