//! Content fetcher for putusan-dl
//!
//! Thin wrapper over a single pooled `reqwest` client shared by the whole run.
//! Non-success HTTP statuses are reported as transport errors.

use std::time::Duration;

use bytes::Bytes;
use log::debug;
use reqwest::{Client, ClientBuilder, Response};

use crate::core::config::{FetchConfig, TlsMode};
use crate::core::error::{Error, Result};

/// HTTP client used for listing, detail and file endpoints
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    tls: TlsMode,
}

impl Fetcher {
    /// Build a fetcher from the `[fetch]` configuration section
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone());

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if config.tls == TlsMode::Relaxed {
            log::warn!("⚠️  TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            tls: config.tls,
        })
    }

    /// Same settings as `config` but always verifying certificates.
    ///
    /// Relaxed TLS is scoped to the crawled site; requests carrying storage
    /// credentials go through this client instead.
    pub fn strict(config: &FetchConfig) -> Result<Self> {
        Self::new(&FetchConfig {
            tls: TlsMode::Strict,
            ..config.clone()
        })
    }

    /// Certificate verification mode the client was built with
    pub fn tls_mode(&self) -> TlsMode {
        self.tls
    }

    /// Underlying client, shared with uploaders that talk HTTP
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a GET request and return the response once its status is known good
    pub async fn open(&self, url: &str) -> Result<Response> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(url, format!("HTTP {status}")));
        }
        Ok(response)
    }

    /// Fetch a resource fully into memory
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.open(url)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::transport(url, e))
    }

    /// Fetch a markup page; invalid UTF-8 is replaced rather than rejected
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
