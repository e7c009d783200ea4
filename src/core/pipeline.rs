//! Pipeline orchestrator
//!
//! Walks listing pages from the configured start page, resolves every detail
//! link to a file, stages it, and hands it to the storage sink. Pages and
//! items are processed strictly in order, one at a time.
//!
//! Gate rejections and resolution misses are recorded in the run report and
//! the run continues. Any other failure halts the run; the report gathered so
//! far travels with the error in [`Aborted`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::config::{Config, CrawlConfig, StagingConfig};
use crate::core::error::{Error, Result};
use crate::core::extract::{
    sanitize_filename, DetailReference, DocumentResolver, FileReference, LinkExtractor,
    RegexLinkExtractor,
};
use crate::core::fetcher::Fetcher;
use crate::core::gate::Gate;
use crate::core::stage::StagedPayload;
use crate::core::storage::{Storage, StoreError, StoredObject};

/// Failure reason recorded when a detail page embeds no file URL
pub const RESOLUTION_MISS: &str = "resolution miss";

/// Recoverable per-item failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub page: u32,
    pub reason: String,
}

/// Why pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "page", rename_all = "snake_case")]
pub enum StopReason {
    /// The page yielded no detail links
    EmptyPage(u32),
    /// The configured end page was processed
    EndPageReached(u32),
}

/// Everything a run accumulates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Page ordinal → detail links found on it
    pub census: BTreeMap<u32, usize>,
    /// Filename (or detail URL for resolution misses) → failure
    pub failures: BTreeMap<String, FailureRecord>,
    /// Objects written, one entry per key, in order of their latest write
    pub stored: Vec<StoredObject>,
    /// Set once pagination has ended normally
    pub stop: Option<StopReason>,
}

impl RunReport {
    fn record_failure(&mut self, key: &str, page: u32, reason: impl Into<String>) {
        self.failures.insert(
            key.to_string(),
            FailureRecord {
                page,
                reason: reason.into(),
            },
        );
    }

    fn record_stored(&mut self, filename: &str, object: StoredObject) {
        // a later success supersedes an earlier failure for the same file
        self.failures.remove(filename);
        // keys are overwritten in place, so keep only the latest write per key
        self.stored.retain(|stored| stored.key != object.key);
        self.stored.push(object);
    }

    /// Whether an object was written under `key` during this run
    pub fn is_stored(&self, key: &str) -> bool {
        self.stored.iter().any(|stored| stored.key == key)
    }

    pub fn total_links(&self) -> usize {
        self.census.values().sum()
    }
}

/// A fatal error together with the report accumulated before it
#[derive(Debug, thiserror::Error)]
#[error("run halted: {error}")]
pub struct Aborted {
    pub report: RunReport,
    #[source]
    pub error: Error,
}

/// Progress notifications for front-ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    PageStarted { page: u32 },
    PageFinished { page: u32, links: usize },
    Stored { key: String },
    Failed { key: String, reason: String },
}

/// Progress callback function type
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Drives pagination and the fetch → gate → store sequence
pub struct Pipeline {
    crawl: CrawlConfig,
    staging: StagingConfig,
    fetcher: Fetcher,
    extractor: Box<dyn LinkExtractor>,
    resolver: DocumentResolver,
    storage: Storage,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(
        crawl: CrawlConfig,
        staging: StagingConfig,
        fetcher: Fetcher,
        extractor: Box<dyn LinkExtractor>,
        resolver: DocumentResolver,
        storage: Storage,
    ) -> Self {
        Self {
            crawl,
            staging,
            fetcher,
            extractor,
            resolver,
            storage,
            progress: None,
        }
    }

    /// Build every component from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let fetcher = Fetcher::new(&config.fetch)?;
        let extractor = RegexLinkExtractor::new(&config.crawl.link_pattern)?;
        let resolver = DocumentResolver::new(&config.crawl.file_pattern)?;
        let gate = Gate::from_config(&config.gate);
        let storage = Storage::from_config(&config.storage, gate, &config.fetch)?;

        Ok(Self::new(
            config.crawl.clone(),
            config.staging.clone(),
            fetcher,
            Box::new(extractor),
            resolver,
            storage,
        ))
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(ref progress) = self.progress {
            progress(&event);
        }
    }

    /// Run until an empty page, the end page, a fatal error or cancellation
    pub async fn run(&self, cancel: &CancellationToken) -> std::result::Result<RunReport, Aborted> {
        let mut report = RunReport::default();
        let mut page = self.crawl.start_page;

        loop {
            if cancel.is_cancelled() {
                return Err(Aborted {
                    report,
                    error: Error::Cancelled,
                });
            }

            let links = match self.process_page(page, &mut report, cancel).await {
                Ok(links) => links,
                Err(error) => return Err(Aborted { report, error }),
            };

            if links == 0 {
                info!("🏁 Page {page} has no documents, stopping");
                report.stop = Some(StopReason::EmptyPage(page));
                break;
            }
            if self.crawl.end_page == Some(page) {
                info!("🏁 Reached end page {page}");
                report.stop = Some(StopReason::EndPageReached(page));
                break;
            }
            match page.checked_add(1) {
                Some(next) => page = next,
                None => {
                    report.stop = Some(StopReason::EndPageReached(page));
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Process one listing page; returns the number of detail links found
    async fn process_page(
        &self,
        page: u32,
        report: &mut RunReport,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        info!("=+=+=+=+= page {page} =+=+=+=+=");
        self.notify(ProgressEvent::PageStarted { page });

        let url = format!("{}{}", self.crawl.base_url, page);
        let content = self.fetcher.fetch_text(&url).await?;

        report.census.insert(page, 0);
        let mut links = 0usize;
        for detail in self.extractor.extract_detail_links(&content) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            links += 1;
            report.census.insert(page, links);
            self.process_item(page, &detail, report).await?;
        }

        debug!("Page {page}: {links} detail links");
        self.notify(ProgressEvent::PageFinished { page, links });
        Ok(links)
    }

    /// resolve → fetch → gate → store for one detail link
    async fn process_item(
        &self,
        page: u32,
        detail: &DetailReference,
        report: &mut RunReport,
    ) -> Result<()> {
        let Some(file_ref) = self.resolver.resolve_file(&self.fetcher, detail).await? else {
            warn!("⚠️  No file URL found on {}", detail.url);
            report.record_failure(&detail.url, page, RESOLUTION_MISS);
            self.notify(ProgressEvent::Failed {
                key: detail.url.clone(),
                reason: RESOLUTION_MISS.to_string(),
            });
            return Ok(());
        };
        info!("🔗 Found file URL: {}", file_ref.url);

        let mut staged = StagedPayload::download(&self.fetcher, &file_ref, &self.staging.dir).await?;
        info!("📥 Downloaded: {} ({} bytes)", file_ref.filename, staged.size());

        match self.storage.store_object(&mut staged, &file_ref.filename).await {
            Ok(object) => {
                self.notify(ProgressEvent::Stored {
                    key: object.key.clone(),
                });
                report.record_stored(&file_ref.filename, object);
            }
            Err(StoreError::Rejected(rejection)) => {
                warn!("🚫 {} rejected: {rejection:?}", file_ref.filename);
                let key = self.storage.object_key(&file_ref.filename);
                if report.is_stored(&key) {
                    // the rejected payload never reached storage; the earlier object stands
                    info!("Keeping the object already stored at '{key}'");
                } else {
                    report.record_failure(&file_ref.filename, page, rejection.to_string());
                }
                self.notify(ProgressEvent::Failed {
                    key: file_ref.filename.clone(),
                    reason: rejection.to_string(),
                });
            }
            Err(StoreError::Failed(error)) => return Err(error),
        }

        if self.staging.keep {
            let dest = self.local_copy_path(&file_ref);
            let kept = staged.persist(&dest)?;
            debug!("Kept local copy at {}", kept.display());
        }
        Ok(())
    }

    fn local_copy_path(&self, file_ref: &FileReference) -> PathBuf {
        self.staging.dir.join(sanitize_filename(&file_ref.filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FetchConfig;
    use crate::core::storage::MemoryUploader;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(server: &MockServer, staging: &std::path::Path, end_page: Option<u32>) -> (Pipeline, MemoryUploader) {
        let crawl = CrawlConfig {
            base_url: format!("{}/list?page=", server.uri()),
            start_page: 1,
            end_page,
            link_pattern: r#"<a href="([^"]+/detail)"><h2>(.*?)</h2></a>"#.to_string(),
            file_pattern: r#"http://[^\s"'<>]*?\.pdf"#.to_string(),
        };
        let staging = StagingConfig {
            dir: staging.to_path_buf(),
            keep: false,
        };
        let uploader = MemoryUploader::new();
        let storage = Storage::new("ns", Gate::default(), Box::new(uploader.clone()));
        let pipeline = Pipeline::new(
            crawl.clone(),
            staging,
            Fetcher::new(&FetchConfig::default()).unwrap(),
            Box::new(RegexLinkExtractor::new(&crawl.link_pattern).unwrap()),
            DocumentResolver::new(&crawl.file_pattern).unwrap(),
            storage,
        );
        (pipeline, uploader)
    }

    async fn mount_page(server: &MockServer, page: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_empty_first_page_stops_without_resolution() {
        let server = MockServer::start().await;
        mount_page(&server, "1", "<html>kosong</html>".to_string()).await;
        let staging = tempfile::tempdir().unwrap();
        let (pipeline, uploader) = pipeline(&server, staging.path(), None);

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.census, BTreeMap::from([(1, 0)]));
        assert_eq!(report.stop, Some(StopReason::EmptyPage(1)));
        assert!(report.failures.is_empty());
        assert!(uploader.objects().is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_miss_is_recorded() {
        let server = MockServer::start().await;
        let detail = format!("{}/doc/1/detail", server.uri());
        mount_page(&server, "1", format!(r#"<a href="{detail}"><h2>Doc 1</h2></a>"#)).await;
        mount_page(&server, "2", String::new()).await;
        Mock::given(method("GET"))
            .and(path("/doc/1/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_string("no attachment here"))
            .mount(&server)
            .await;
        let staging = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(&server, staging.path(), None);

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.census, BTreeMap::from([(1, 1), (2, 0)]));
        assert_eq!(
            report.failures.get(&detail),
            Some(&FailureRecord {
                page: 1,
                reason: RESOLUTION_MISS.to_string()
            })
        );
        assert!(report.stored.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        let staging = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(&server, staging.path(), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let aborted = pipeline.run(&cancel).await.unwrap_err();
        assert!(matches!(aborted.error, Error::Cancelled));
        assert!(aborted.report.census.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_halts_with_report() {
        let server = MockServer::start().await;
        mount_page(&server, "1", String::new()).await;
        let staging = tempfile::tempdir().unwrap();
        let (mut pipeline, _) = pipeline(&server, staging.path(), None);
        pipeline.crawl.start_page = 5;

        let aborted = pipeline.run(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(aborted.error.kind(), "transport");
        assert!(aborted.to_string().starts_with("run halted: transport error"));
    }

    #[test]
    fn test_record_stored_clears_earlier_failure() {
        let mut report = RunReport::default();
        report.record_failure("a.pdf", 1, "type not allowed");
        report.record_stored(
            "a.pdf",
            StoredObject {
                key: "ns/a.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size: 8,
            },
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.stored.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_after_store_keeps_stored_object() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "1",
            format!(
                r#"<a href="{uri}/x/detail"><h2>X</h2></a><a href="{uri}/y/detail"><h2>Y</h2></a>"#,
                uri = server.uri()
            ),
        )
        .await;
        mount_page(&server, "2", String::new()).await;
        for (dir, body) in [("x", b"%PDF-1.4 asli".as_slice()), ("y", b"bukan pdf".as_slice())] {
            Mock::given(method("GET"))
                .and(path(format!("/{dir}/detail")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(format!(r#"<a href="{}/{dir}/a.pdf">a</a>"#, server.uri())),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/{dir}/a.pdf")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
                .mount(&server)
                .await;
        }
        let staging = tempfile::tempdir().unwrap();
        let (pipeline, uploader) = pipeline(&server, staging.path(), None);

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.census[&1], 2);
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored[0].key, "ns/a.pdf");
        assert!(report.failures.is_empty());
        assert_eq!(
            uploader.get("ns/a.pdf").unwrap().data.as_ref(),
            b"%PDF-1.4 asli"
        );
    }

    #[test]
    fn test_report_serializes_stop_reason() {
        let report = RunReport {
            stop: Some(StopReason::EmptyPage(7)),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stop"]["kind"], "empty_page");
        assert_eq!(json["stop"]["page"], 7);
    }
}
