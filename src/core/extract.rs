//! Link extraction and document resolution
//!
//! Listing pages yield [`DetailReference`]s through a [`LinkExtractor`]; each
//! detail page is then resolved to at most one [`FileReference`].

use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::core::error::{Error, Result};
use crate::core::fetcher::Fetcher;

/// URL of a document's detail page, taken from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailReference {
    pub url: String,
}

/// Downloadable file URL plus the filename derived from its last path segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    pub url: String,
    pub filename: String,
}

impl FileReference {
    /// Derive a file reference; `None` when the URL has no usable final segment
    pub fn from_url(raw: &str) -> Option<Self> {
        let parsed = url::Url::parse(raw).ok()?;
        let segment = parsed.path_segments()?.next_back()?;
        if segment.is_empty() {
            return None;
        }
        Some(Self {
            url: raw.to_string(),
            filename: sanitize_filename(segment),
        })
    }
}

/// Filenames become object keys and local paths; slashes must not survive
pub fn sanitize_filename(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Produces candidate detail links from a listing page's markup
pub trait LinkExtractor: Send + Sync {
    /// Lazily yield detail links in document order, duplicates included
    fn extract_detail_links<'a>(
        &'a self,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = DetailReference> + Send + 'a>;
}

/// Extractor driven by a regex whose first capture is the href and whose
/// optional second capture is the anchor label
pub struct RegexLinkExtractor {
    pattern: Regex,
}

impl RegexLinkExtractor {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid link pattern: {e}")))?;
        if pattern.captures_len() < 2 {
            return Err(Error::Config(
                "link pattern needs a capture group for the href".to_string(),
            ));
        }
        Ok(Self { pattern })
    }
}

impl LinkExtractor for RegexLinkExtractor {
    fn extract_detail_links<'a>(
        &'a self,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = DetailReference> + Send + 'a> {
        Box::new(self.pattern.captures_iter(content).filter_map(|caps| {
            let href = caps.get(1)?.as_str();
            // anchors with an empty heading are navigation, not documents
            if let Some(label) = caps.get(2) {
                if label.as_str().trim().is_empty() {
                    return None;
                }
            }
            Some(DetailReference {
                url: href.to_string(),
            })
        }))
    }
}

/// Resolves a detail page to the single file URL it embeds
pub struct DocumentResolver {
    pattern: Regex,
}

impl DocumentResolver {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid file pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// First matching file URL in `content`
    pub fn find_file(&self, content: &str) -> Option<FileReference> {
        let found = self.pattern.find(content)?;
        FileReference::from_url(found.as_str())
    }

    /// Fetch the detail page and resolve it; `Ok(None)` is a resolution miss
    pub async fn resolve_file(
        &self,
        fetcher: &Fetcher,
        detail: &DetailReference,
    ) -> Result<Option<FileReference>> {
        let content = fetcher.fetch_text(&detail.url).await?;
        let file = self.find_file(&content);
        if file.is_none() {
            debug!("No file URL on detail page {}", detail.url);
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DEFAULT_FILE_PATTERN, DEFAULT_LINK_PATTERN};

    const LISTING: &str = r#"
        <div class="card">
          <a class="d-inline-block" href="https://jdih.mahkamahagung.go.id/legal-product/putusan-1-k-pid-2020/detail">
            <h2>Putusan 1 K/Pid/2020</h2>
          </a>
          <a class="d-inline-block" href="https://jdih.mahkamahagung.go.id/legal-product/putusan-2-k-pdt-2021/detail"><h2>Putusan 2 K/Pdt/2021</h2></a>
          <a class="d-inline-block" href="https://jdih.mahkamahagung.go.id/legal-product/kosong/detail"><h2>  </h2></a>
          <a class="d-inline-block" href="https://example.org/legal-product/other/detail"><h2>Elsewhere</h2></a>
          <a class="d-inline-block" href="https://jdih.mahkamahagung.go.id/legal-product/putusan-1-k-pid-2020/detail"><h2>Putusan 1 K/Pid/2020</h2></a>
        </div>
    "#;

    #[test]
    fn test_extracts_in_document_order_with_duplicates() {
        let extractor = RegexLinkExtractor::new(DEFAULT_LINK_PATTERN).unwrap();
        let links: Vec<String> = extractor
            .extract_detail_links(LISTING)
            .map(|d| d.url)
            .collect();

        assert_eq!(
            links,
            vec![
                "https://jdih.mahkamahagung.go.id/legal-product/putusan-1-k-pid-2020/detail",
                "https://jdih.mahkamahagung.go.id/legal-product/putusan-2-k-pdt-2021/detail",
                "https://jdih.mahkamahagung.go.id/legal-product/putusan-1-k-pid-2020/detail",
            ]
        );
    }

    #[test]
    fn test_no_matches_yields_empty_sequence() {
        let extractor = RegexLinkExtractor::new(DEFAULT_LINK_PATTERN).unwrap();
        let mut links = extractor.extract_detail_links("<html><body>Tidak ada data</body></html>");
        assert!(links.next().is_none());
    }

    #[test]
    fn test_link_pattern_without_label_group() {
        let extractor = RegexLinkExtractor::new(r#"href="([^"]+/detail)""#).unwrap();
        let count = extractor
            .extract_detail_links(r#"<a href="/a/detail"></a><a href="/b/detail"></a>"#)
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_link_pattern_needs_capture_group() {
        assert!(matches!(
            RegexLinkExtractor::new(r"href=.*?detail"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RegexLinkExtractor::new(r"href=(unclosed"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_find_first_pdf_url() {
        let resolver = DocumentResolver::new(DEFAULT_FILE_PATTERN).unwrap();
        let detail = r#"
            <a href="https://jdih.mahkamahagung.go.id/storage/uploads/produk_hukum/putusan_1_k_pid_2020.pdf">Unduh</a>
            <a href="https://jdih.mahkamahagung.go.id/storage/uploads/produk_hukum/lampiran.pdf">Lampiran</a>
        "#;

        let file = resolver.find_file(detail).unwrap();
        assert_eq!(
            file.url,
            "https://jdih.mahkamahagung.go.id/storage/uploads/produk_hukum/putusan_1_k_pid_2020.pdf"
        );
        assert_eq!(file.filename, "putusan_1_k_pid_2020.pdf");
    }

    #[test]
    fn test_resolution_miss() {
        let resolver = DocumentResolver::new(DEFAULT_FILE_PATTERN).unwrap();
        assert!(resolver
            .find_file(r#"<a href="https://example.org/file.docx">docx</a>"#)
            .is_none());
        assert!(resolver.find_file("").is_none());
    }

    #[test]
    fn test_file_reference_from_url() {
        let file = FileReference::from_url("https://host/a/b/Putusan%20X.pdf?download=1").unwrap();
        assert_eq!(file.filename, "Putusan%20X.pdf");

        assert!(FileReference::from_url("https://host/dir/").is_none());
        assert!(FileReference::from_url("not a url").is_none());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("1/K/Pid/2020.pdf"), "1_K_Pid_2020.pdf");
        assert_eq!(sanitize_filename("plain.pdf"), "plain.pdf");
    }
}
