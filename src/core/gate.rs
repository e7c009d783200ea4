//! Type/size gate
//!
//! Classifies a payload from its leading bytes (never from the filename or the
//! server's `Content-Type`) and enforces the allow-list and the optional size
//! limit.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::config::GateConfig;

/// Number of leading bytes inspected by [`sniff`]
pub const SNIFF_LEN: usize = 512;

/// Fallback for binary content nothing else recognizes
pub const OCTET_STREAM: &str = "application/octet-stream";

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Leading-byte signatures, checked in order
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"RIFF", "image/webp"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"\x1f\x8b", "application/gzip"),
    (b"Rar!\x1a\x07", "application/x-rar-compressed"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/x-ole-storage"),
];

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";

/// Why a payload was refused; recoverable, the run continues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("type not allowed")]
    TypeNotAllowed { detected: String },

    #[error("size exceeded")]
    SizeExceeded { size: u64, limit: u64 },
}

/// Classify `header` (the first [`SNIFF_LEN`] bytes of a payload)
pub fn sniff(header: &[u8]) -> &'static str {
    let header = &header[..header.len().min(SNIFF_LEN)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| header.starts_with(magic)) {
        // RIFF is a container; only WEBP is an image
        if *mime == "image/webp" && header.get(8..12) != Some(b"WEBP".as_slice()) {
            return OCTET_STREAM;
        }
        return *mime;
    }

    if header.starts_with(ZIP_LOCAL_HEADER) {
        return sniff_zip(header);
    }

    if is_text(header) {
        return sniff_text(header);
    }

    OCTET_STREAM
}

/// Office Open XML files are zip archives whose entries live under a
/// well-known top-level directory. Only entry names are inspected.
fn sniff_zip(header: &[u8]) -> &'static str {
    zip_entry_names(header)
        .find_map(ooxml_for_entry)
        .unwrap_or("application/zip")
}

fn ooxml_for_entry(name: &[u8]) -> Option<&'static str> {
    if name.starts_with(b"word/") {
        Some(DOCX)
    } else if name.starts_with(b"xl/") {
        Some(XLSX)
    } else if name.starts_with(b"ppt/") {
        Some(PPTX)
    } else {
        None
    }
}

/// Names of the zip local file headers found in `data`.
///
/// Headers are located by signature rather than by skipping compressed data,
/// since entries written with a trailing data descriptor carry zero sizes.
/// A name cut by the end of `data` is returned truncated.
fn zip_entry_names(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.windows(ZIP_LOCAL_HEADER.len())
        .enumerate()
        .filter(|(_, window)| *window == ZIP_LOCAL_HEADER)
        .filter_map(move |(offset, _)| {
            let header = data.get(offset..offset + 30)?;
            let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
            let start = offset + 30;
            let end = (start + name_len).min(data.len());
            data.get(start..end)
        })
}

/// Printable UTF-8 text, tolerating a multi-byte character cut at the window edge
fn is_text(header: &[u8]) -> bool {
    let valid = match std::str::from_utf8(header) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            // incomplete trailing sequence only
            match std::str::from_utf8(&header[..e.valid_up_to()]) {
                Ok(s) => s,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !valid
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}

fn sniff_text(header: &[u8]) -> &'static str {
    let text = String::from_utf8_lossy(header);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("<svg") || (lower.starts_with("<?xml") && lower.contains("<svg")) {
        "image/svg+xml"
    } else if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        "text/html"
    } else if lower.starts_with("<?xml") {
        "text/xml"
    } else {
        "text/plain"
    }
}

/// Allow-list and optional size limit applied before anything is stored
#[derive(Debug, Clone)]
pub struct Gate {
    allowed: BTreeSet<String>,
    max_size: Option<u64>,
}

impl Gate {
    pub fn new<I, S>(allowed: I, max_size: Option<u64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            max_size,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.allowed_types.iter().cloned(), config.max_size)
    }

    /// Accept or reject a payload of `size` bytes starting with `header`.
    /// Returns the sniffed media type on acceptance.
    pub fn classify(&self, header: &[u8], size: u64) -> Result<String, Rejection> {
        if let Some(limit) = self.max_size {
            if size > limit {
                return Err(Rejection::SizeExceeded { size, limit });
            }
        }

        let detected = sniff(header);
        if !self.allowed.contains(detected) {
            return Err(Rejection::TypeNotAllowed {
                detected: detected.to_string(),
            });
        }
        Ok(detected.to_string())
    }

    pub fn is_allowed(&self, media_type: &str) -> bool {
        self.allowed.contains(media_type)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}
