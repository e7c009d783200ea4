//! # Putusan-dl CLI
//!
//! Command-line interface for the putusan-dl library.
//! Crawls the court-decision listings and archives the documents.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use putusan_dl::{
    Aborted, CancellationToken, Config, Pipeline, RunReport, StorageBackend, TlsMode,
};

mod cli;

/// Command-line interface for putusan-dl
#[derive(Parser, Debug)]
#[command(name = "putusan-dl")]
#[command(about = "Court decision harvester: listing pages → detail pages → files → object storage")]
#[command(long_about = "Walks the paginated listing, resolves every detail page to its file,
checks the file type against the allow-list and stores accepted files:
  putusan-dl --bucket hukumku-prod-bucket                  # Crawl from page 1 until an empty page
  putusan-dl --start-page 88 --end-page 139 --bucket b     # Crawl a page range
  putusan-dl --backend filesystem --keep-downloads         # Archive into ./objects, keep local copies
  putusan-dl --dry-run --end-page 1                        # Run everything, persist nothing

Settings come from --config (TOML) and are overridden by flags and environment variables.")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PUTUSAN_CONFIG")]
    config: Option<PathBuf>,

    /// First listing page to crawl
    #[arg(long, env = "PUTUSAN_START_PAGE")]
    start_page: Option<u32>,

    /// Last listing page to crawl (inclusive)
    #[arg(long, env = "PUTUSAN_END_PAGE")]
    end_page: Option<u32>,

    /// Listing URL prefix; the page number is appended
    #[arg(long, env = "PUTUSAN_BASE_URL")]
    base_url: Option<String>,

    /// Object key prefix
    #[arg(long, env = "PUTUSAN_NAMESPACE")]
    namespace: Option<String>,

    /// Storage backend
    #[arg(long, value_enum, env = "PUTUSAN_BACKEND")]
    backend: Option<StorageBackend>,

    /// Destination bucket (gcs backend)
    #[arg(long, env = "PUTUSAN_BUCKET")]
    bucket: Option<String>,

    /// File holding the storage access token
    #[arg(long, env = "PUTUSAN_CREDENTIAL")]
    credential: Option<PathBuf>,

    /// Certificate verification mode
    #[arg(long, value_enum, env = "PUTUSAN_TLS")]
    tls: Option<TlsMode>,

    /// Per-request timeout in seconds (0 disables it)
    #[arg(long, env = "PUTUSAN_TIMEOUT")]
    timeout: Option<u64>,

    /// Reject payloads larger than this many bytes
    #[arg(long, env = "PUTUSAN_MAX_SIZE")]
    max_size: Option<u64>,

    /// Directory for in-flight downloads
    #[arg(long, env = "PUTUSAN_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Keep a local copy of every download in the staging directory
    #[arg(long)]
    keep_downloads: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run the whole pipeline but keep stored objects in memory only
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Load the configuration file (if any) and apply flag overrides
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(page) = self.start_page {
            config.crawl.start_page = page;
        }
        if let Some(page) = self.end_page {
            config.crawl.end_page = Some(page);
        }
        if let Some(ref url) = self.base_url {
            config.crawl.base_url = url.clone();
        }
        if let Some(ref namespace) = self.namespace {
            config.storage.namespace = namespace.clone();
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(ref bucket) = self.bucket {
            config.storage.bucket = Some(bucket.clone());
        }
        if let Some(ref credential) = self.credential {
            config.storage.credential = Some(credential.clone());
        }
        if let Some(tls) = self.tls {
            config.fetch.tls = tls;
        }
        if let Some(secs) = self.timeout {
            config.fetch.timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(limit) = self.max_size {
            config.gate.max_size = Some(limit);
        }
        if let Some(ref dir) = self.staging_dir {
            config.staging.dir = dir.clone();
        }
        if self.keep_downloads {
            config.staging.keep = true;
        }
        if self.dry_run {
            config.storage.backend = StorageBackend::Memory;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut logger = env_logger::Builder::new();
    logger
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("⚖️  Putusan-dl v{} starting...", env!("CARGO_PKG_VERSION"));
    }

    let config = cli.resolve_config()?;
    if cli.dry_run {
        eprintln!("🔍 [DRY RUN] Objects are kept in memory; nothing is uploaded");
    }
    show_run_info(&config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Interrupt received, stopping after the current item");
                cancel.cancel();
            }
        }
    });

    let progress = cli::ProgressManager::new("🌐 Harvesting documents");
    let pipeline = Pipeline::from_config(&config)?.with_progress(progress.callback());
    let outcome = pipeline.run(&cancel).await;
    progress.finish();

    let (report, failure) = match outcome {
        Ok(report) => (report, None),
        Err(Aborted { report, error }) => (report, Some(error)),
    };

    cli::print_report(&report);
    if let Some(ref path) = cli.report {
        write_json_report(path, &report)?;
        info!("📝 Report written to {}", path.display());
    }

    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

/// Show where documents come from and where they go
fn show_run_info(config: &Config) {
    let pages = match config.crawl.end_page {
        Some(end) => format!("pages {}..={end}", config.crawl.start_page),
        None => format!("pages {}.. until an empty page", config.crawl.start_page),
    };
    info!("🌐 Crawling {}{{page}} ({pages})", config.crawl.base_url);
    let destination = match config.storage.backend {
        StorageBackend::Gcs => format!(
            "gs://{}/{}",
            config.storage.bucket.as_deref().unwrap_or_default(),
            config.storage.namespace
        ),
        StorageBackend::Filesystem => config
            .storage
            .root
            .join(&config.storage.namespace)
            .display()
            .to_string(),
        StorageBackend::Memory => "memory".to_string(),
    };
    info!("📁 Storing to: {destination}");
}

fn write_json_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("cannot serialize run report")?;
    std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("putusan-dl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--start-page",
            "88",
            "--end-page",
            "139",
            "--bucket",
            "hukumku-prod-bucket",
            "--tls",
            "relaxed",
            "--max-size",
            "5242880",
        ]);
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.crawl.start_page, 88);
        assert_eq!(config.crawl.end_page, Some(139));
        assert_eq!(config.storage.bucket.as_deref(), Some("hukumku-prod-bucket"));
        assert_eq!(config.fetch.tls, TlsMode::Relaxed);
        assert_eq!(config.gate.max_size, Some(5_242_880));
    }

    #[test]
    fn test_dry_run_forces_memory_backend() {
        let cli = parse(&["--dry-run", "--backend", "gcs"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_gcs_without_bucket_is_rejected() {
        let cli = parse(&["--backend", "gcs"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let cli = parse(&["--dry-run", "--timeout", "0"]);
        assert_eq!(cli.resolve_config().unwrap().fetch.timeout_secs, None);
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("putusan.toml");
        std::fs::write(
            &path,
            "[crawl]\nstart_page = 5\nend_page = 9\n\n[storage]\nbackend = \"filesystem\"\nnamespace = \"arsip\"\n",
        )
        .unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--end-page", "7"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.crawl.start_page, 5);
        assert_eq!(config.crawl.end_page, Some(7));
        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(config.storage.namespace, "arsip");
    }
}
