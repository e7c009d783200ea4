//! Storage sink for putusan-dl
//!
//! [`Storage`] gates a staged payload and hands accepted ones to an
//! [`Uploader`] under `{namespace}/{filename}`. Writes overwrite any existing
//! object at the same key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::core::config::{FetchConfig, StorageBackend, StorageConfig, TlsMode};
use crate::core::error::{Error, Result};
use crate::core::fetcher::Fetcher;
use crate::core::gate::{Gate, Rejection};
use crate::core::stage::StagedPayload;

/// Environment variable consulted when no credential file is configured
pub const TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";

/// Durable record of an accepted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub size: u64,
}

/// Outcome of [`Storage::store_object`] when nothing was stored
#[derive(Debug, Error)]
pub enum StoreError {
    /// The gate refused the payload; recoverable
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The backend or the staging file failed; fatal
    #[error(transparent)]
    Failed(#[from] Error),
}

/// Writes one object to a storage backend
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store `body` (`size` bytes) at `key`, replacing any existing object
    async fn upload(&self, key: &str, content_type: &str, body: File, size: u64) -> Result<()>;

    /// Human-readable destination for logs
    fn describe(&self) -> String;
}

/// Storage sink: gate, then upload
pub struct Storage {
    namespace: String,
    gate: Gate,
    uploader: Box<dyn Uploader>,
}

impl Storage {
    pub fn new(namespace: impl Into<String>, gate: Gate, uploader: Box<dyn Uploader>) -> Self {
        Self {
            namespace: namespace.into(),
            gate,
            uploader,
        }
    }

    /// Build the sink for the configured backend
    pub fn from_config(config: &StorageConfig, gate: Gate, fetch: &FetchConfig) -> Result<Self> {
        let uploader: Box<dyn Uploader> = match config.backend {
            StorageBackend::Gcs => Box::new(GcsUploader::from_config(config, fetch)?),
            StorageBackend::Filesystem => Box::new(FsUploader::new(&config.root)),
            StorageBackend::Memory => Box::new(MemoryUploader::new()),
        };
        Ok(Self::new(config.namespace.clone(), gate, uploader))
    }

    /// Object key for `filename`
    pub fn object_key(&self, filename: &str) -> String {
        let namespace = self.namespace.trim_matches('/');
        if namespace.is_empty() {
            filename.to_string()
        } else {
            format!("{namespace}/{filename}")
        }
    }

    /// Gate `payload` and upload it under `filename`; returns the stored record
    pub async fn store_object(
        &self,
        payload: &mut StagedPayload,
        filename: &str,
    ) -> std::result::Result<StoredObject, StoreError> {
        let content_type = self.gate.classify(payload.header(), payload.size())?;
        let key = self.object_key(filename);

        let body = payload.reader().await?;
        self.uploader
            .upload(&key, &content_type, body, payload.size())
            .await?;

        info!("☁️  File uploaded to '{key}' in {}", self.uploader.describe());
        Ok(StoredObject {
            key,
            content_type,
            size: payload.size(),
        })
    }

    pub fn describe(&self) -> String {
        self.uploader.describe()
    }
}

/// Google Cloud Storage via the JSON API simple-upload endpoint
pub struct GcsUploader {
    fetcher: Fetcher,
    endpoint: String,
    bucket: String,
    token: String,
}

impl GcsUploader {
    pub fn new(
        fetcher: Fetcher,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            token: token.into(),
        }
    }

    /// Resolve bucket and access token from the `[storage]` section.
    /// Timeouts and user agent come from `fetch`; certificates are always verified.
    pub fn from_config(config: &StorageConfig, fetch: &FetchConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| Error::Config("gcs backend requires a bucket".to_string()))?;
        let token = match &config.credential {
            Some(path) => read_token(path)?,
            None => std::env::var(TOKEN_ENV).map_err(|_| {
                Error::Config(format!("no credential file configured and {TOKEN_ENV} is unset"))
            })?,
        };
        let fetcher = Fetcher::strict(fetch)?;
        Ok(Self::new(fetcher, config.endpoint.clone(), bucket, token))
    }

    pub fn tls_mode(&self) -> TlsMode {
        self.fetcher.tls_mode()
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint.trim_end_matches('/'),
            self.bucket
        )
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read credential {}: {e}", path.display())))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::Config(format!("credential {} is empty", path.display())));
    }
    Ok(token.to_string())
}

#[async_trait]
impl Uploader for GcsUploader {
    async fn upload(&self, key: &str, content_type: &str, body: File, size: u64) -> Result<()> {
        let response = self
            .fetcher
            .client()
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key)])
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(body)))
            .send()
            .await
            .map_err(|e| Error::storage(key, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::storage(key, format!("HTTP {status}: {}", detail.trim())));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("bucket '{}'", self.bucket)
    }
}

/// Sidecar written next to each object by [`FsUploader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size: u64,
}

/// Local directory tree; `key` maps to `{root}/{key}`
pub struct FsUploader {
    root: PathBuf,
}

impl FsUploader {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.meta.json"))
    }
}

#[async_trait]
impl Uploader for FsUploader {
    async fn upload(&self, key: &str, content_type: &str, mut body: File, size: u64) -> Result<()> {
        let dest = self.object_path(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(key, e))?;
        }

        let mut out = File::create(&dest)
            .await
            .map_err(|e| Error::storage(key, e))?;
        tokio::io::copy(&mut body, &mut out)
            .await
            .map_err(|e| Error::storage(key, e))?;

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size,
        };
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| Error::storage(key, e))?;
        tokio::fs::write(self.meta_path(key), meta_json)
            .await
            .map_err(|e| Error::storage(key, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("directory '{}'", self.root.display())
    }
}

/// Object held by [`MemoryUploader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    pub content_type: String,
    pub data: Bytes,
}

/// In-process backend for dry runs and tests. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryUploader {
    objects: Arc<Mutex<BTreeMap<String, MemoryObject>>>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored object
    pub fn objects(&self) -> BTreeMap<String, MemoryObject> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<MemoryObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, key: &str, content_type: &str, mut body: File, size: u64) -> Result<()> {
        let mut data = Vec::with_capacity(size as usize);
        body.read_to_end(&mut data)
            .await
            .map_err(|e| Error::storage(key, e))?;

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| Error::storage(key, "memory store poisoned"))?;
        objects.insert(
            key.to_string(),
            MemoryObject {
                content_type: content_type.to_string(),
                data: Bytes::from(data),
            },
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
