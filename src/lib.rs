//! # Putusan-dl Library
//!
//! Harvests court decisions from a paginated listing site into object storage.
//!
//! ## Features
//!
//! - **Sequential crawl**: listing pages are walked from a start page until an
//!   empty page or the configured end page
//! - **Content sniffing**: payload types are detected from their leading bytes
//!   and checked against an allow-list before anything is stored
//! - **Pluggable storage**: Google Cloud Storage, a local directory, or memory
//! - **Run report**: per-page census, recoverable failures and stored objects
//! - **Progress tracking**: optional callbacks for custom UIs
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use putusan_dl::{CancellationToken, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.storage.bucket = Some("my-bucket".to_string());
//!     config.crawl.end_page = Some(3);
//!
//!     let report = putusan_dl::harvest(&config, &CancellationToken::new()).await?;
//!     println!("{} objects stored", report.stored.len());
//!     Ok(())
//! }
//! ```

pub use tokio_util::sync::CancellationToken;

pub use crate::core::config::{
    Config, CrawlConfig, FetchConfig, GateConfig, StagingConfig, StorageBackend, StorageConfig,
    TlsMode, DEFAULT_ALLOWED_TYPES, DEFAULT_BASE_URL, DEFAULT_FILE_PATTERN, DEFAULT_LINK_PATTERN,
};
pub use crate::core::error::{Error, Result};
pub use crate::core::extract::{
    sanitize_filename, DetailReference, DocumentResolver, FileReference, LinkExtractor,
    RegexLinkExtractor,
};
pub use crate::core::fetcher::Fetcher;
pub use crate::core::gate::{sniff, Gate, Rejection, SNIFF_LEN};
pub use crate::core::pipeline::{
    Aborted, FailureRecord, Pipeline, ProgressCallback, ProgressEvent, RunReport, StopReason,
    RESOLUTION_MISS,
};
pub use crate::core::stage::StagedPayload;
pub use crate::core::storage::{
    FsUploader, GcsUploader, MemoryObject, MemoryUploader, ObjectMeta, Storage, StoreError,
    StoredObject, Uploader,
};

// Internal modules
mod core;

/// Run the whole pipeline for `config`
///
/// Returns the run report, or [`Aborted`] carrying the partial report when a
/// fatal error or cancellation stopped the run early.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = putusan_dl::Config::load("putusan.toml".as_ref())?;
/// let cancel = putusan_dl::CancellationToken::new();
/// match putusan_dl::harvest(&config, &cancel).await {
///     Ok(report) => println!("stored {}", report.stored.len()),
///     Err(aborted) => eprintln!("stopped after {} pages", aborted.report.census.len()),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn harvest(
    config: &Config,
    cancel: &CancellationToken,
) -> std::result::Result<RunReport, Aborted> {
    let pipeline = Pipeline::from_config(config).map_err(|error| Aborted {
        report: RunReport::default(),
        error,
    })?;
    pipeline.run(cancel).await
}

/// Run the pipeline with a progress callback
pub async fn harvest_with_progress<F>(
    config: &Config,
    cancel: &CancellationToken,
    progress: F,
) -> std::result::Result<RunReport, Aborted>
where
    F: Fn(&ProgressEvent) + Send + Sync + 'static,
{
    let pipeline = Pipeline::from_config(config)
        .map_err(|error| Aborted {
            report: RunReport::default(),
            error,
        })?
        .with_progress(std::sync::Arc::new(progress));
    pipeline.run(cancel).await
}
