//! Local staging of downloads
//!
//! A download is streamed once into a temporary file inside the staging
//! directory while its first [`SNIFF_LEN`] bytes are kept in memory for the
//! gate. The open handle is rewound for the upload, so the file is never
//! re-opened. The temporary file is removed when the [`StagedPayload`] is
//! dropped, whatever the outcome of the item.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use log::debug;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::core::error::{Error, Result};
use crate::core::extract::FileReference;
use crate::core::fetcher::Fetcher;
use crate::core::gate::SNIFF_LEN;

/// A downloaded file waiting for the gate and the storage sink
pub struct StagedPayload {
    file: File,
    path: TempPath,
    header: Vec<u8>,
    size: u64,
}

impl StagedPayload {
    /// Download `file_ref` into `staging_dir`
    pub async fn download(
        fetcher: &Fetcher,
        file_ref: &FileReference,
        staging_dir: &Path,
    ) -> Result<Self> {
        let response = fetcher.open(&file_ref.url).await?;
        let mut staged = Self::create(staging_dir).await?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::transport(&file_ref.url, e))?;
            staged.write_chunk(&chunk).await?;
        }
        staged.finish().await?;

        debug!(
            "📥 Downloaded {} ({} bytes) to {}",
            file_ref.filename,
            staged.size,
            staged.path().display()
        );
        Ok(staged)
    }

    /// Stage an in-memory payload; used when the bytes are already at hand
    pub async fn from_bytes(staging_dir: &Path, data: &[u8]) -> Result<Self> {
        let mut staged = Self::create(staging_dir).await?;
        staged.write_chunk(data).await?;
        staged.finish().await?;
        Ok(staged)
    }

    async fn create(staging_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(staging_dir)
            .await
            .map_err(|e| Error::staging(staging_dir, e))?;

        let named = tempfile::Builder::new()
            .prefix(".putusan-")
            .suffix(".part")
            .tempfile_in(staging_dir)
            .map_err(|e| Error::staging(staging_dir, e))?;
        let (file, path) = named.into_parts();

        Ok(Self {
            file: File::from_std(file),
            path,
            header: Vec::with_capacity(SNIFF_LEN),
            size: 0,
        })
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.header.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.header.len()).min(chunk.len());
            self.header.extend_from_slice(&chunk[..take]);
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| Error::staging(&self.path, e))?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| Error::staging(&self.path, e))?;
        self.rewind().await
    }

    /// Move the read position back to the start of the payload
    pub async fn rewind(&mut self) -> Result<()> {
        self.file
            .rewind()
            .await
            .map_err(|e| Error::staging(&self.path, e))?;
        Ok(())
    }

    /// Leading bytes used for content sniffing
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Total payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Readable handle positioned at the start of the payload.
    ///
    /// The handle shares the staged file descriptor; it does not re-open the path.
    pub async fn reader(&mut self) -> Result<File> {
        self.rewind().await?;
        self.file
            .try_clone()
            .await
            .map_err(|e| Error::staging(&self.path, e))
    }

    /// Keep the payload on disk at `dest` instead of deleting it
    pub fn persist(self, dest: &Path) -> Result<PathBuf> {
        let Self { file, path, .. } = self;
        drop(file);
        path.persist(dest)
            .map_err(|e| Error::staging(dest, e.error))?;
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FetchConfig;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_buffers_header_and_counts_size() {
        let mock_server = MockServer::start().await;
        let mut body = b"%PDF-1.4\n".to_vec();
        body.extend(std::iter::repeat(b'x').take(4096));
        Mock::given(method("GET"))
            .and(path("/files/putusan.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let file_ref =
            FileReference::from_url(&format!("{}/files/putusan.pdf", mock_server.uri())).unwrap();

        let mut staged = StagedPayload::download(&fetcher, &file_ref, dir.path())
            .await
            .unwrap();

        assert_eq!(staged.size(), body.len() as u64);
        assert_eq!(staged.header(), &body[..SNIFF_LEN]);
        assert!(staged.path().starts_with(dir.path()));

        let mut reader = staged.reader().await.unwrap();
        let mut read_back = Vec::new();
        reader.read_to_end(&mut read_back).await.unwrap();
        assert_eq!(read_back, body);
    }

    #[tokio::test]
    async fn test_staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedPayload::from_bytes(dir.path(), b"short").await.unwrap();
        let staged_path = staged.path().to_path_buf();

        assert!(staged_path.exists());
        assert_eq!(staged.header(), b"short");
        drop(staged);
        assert!(!staged_path.exists(), "staging file should be deleted on drop");
    }

    #[tokio::test]
    async fn test_persist_keeps_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedPayload::from_bytes(dir.path(), b"%PDF-1.7").await.unwrap();
        let dest = dir.path().join("putusan.pdf");

        let kept = staged.persist(&dest).unwrap();
        assert_eq!(kept, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_reader_can_be_taken_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedPayload::from_bytes(dir.path(), b"abc").await.unwrap();

        for _ in 0..2 {
            let mut reader = staged.reader().await.unwrap();
            let mut buf = String::new();
            reader.read_to_string(&mut buf).await.unwrap();
            assert_eq!(buf, "abc");
        }
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let mock_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let file_ref =
            FileReference::from_url(&format!("{}/missing.pdf", mock_server.uri())).unwrap();

        let err = StagedPayload::download(&fetcher, &file_ref, dir.path())
            .await
            .err()
            .expect("download of a missing file should fail");
        assert_eq!(err.kind(), "transport");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
