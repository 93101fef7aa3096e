//! MIME detection collaborators.
//!
//! [`SniffDetector`] reads the head of the file and matches magic bytes,
//! then falls back to the extension and finally to a UTF-8 check.
//! [`FileCommandDetector`] asks `file(1)`.

use std::{
    ffi::OsStr,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    error::{CoreError, CoreResult},
    util::process::run_tool,
};

/// Bytes read for content sniffing.
pub const SNIFF_LEN: usize = 512;

pub const OCTET_STREAM: &str = "application/octet-stream";

pub const TEXT_PLAIN: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub mime: String,
    /// Head of the file, when the detector had to read it.
    pub head: Option<Vec<u8>>,
}

#[async_trait]
pub trait MimeDetector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, path: &Path) -> CoreResult<Detection>;
}

/// Magic signatures checked at offset 0.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"PK\x05\x06", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xfd7zXZ\x00", "application/x-xz"),
    (b"Rar!\x1a\x07", "application/x-rar"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x7fELF", "application/x-executable"),
];

const TAR_MAGIC_OFFSET: usize = 257;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SniffMode {
    /// Magic bytes, then extension, then UTF-8 check
    Full,
    /// Magic bytes and UTF-8 check; the extension is ignored
    ContentOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct SniffDetector {
    mode: SniffMode,
}

impl SniffDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: SniffMode::Full,
        }
    }

    /// Variant used for re-detection when the extension proved misleading.
    #[must_use]
    pub const fn content_only() -> Self {
        Self {
            mode: SniffMode::ContentOnly,
        }
    }

    fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        std::fs::File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)?;
        Ok(head)
    }

    fn classify(&self, path: &Path, head: &[u8]) -> String {
        if let Some(mime) = sniff_magic(head) {
            return mime.to_string();
        }

        if self.mode == SniffMode::Full {
            if let Some(guess) = mime_guess::from_path(path).first_raw() {
                return guess.to_string();
            }
        }

        if looks_like_text(head) {
            TEXT_PLAIN.to_string()
        } else {
            OCTET_STREAM.to_string()
        }
    }
}

impl Default for SniffDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MimeDetector for SniffDetector {
    fn name(&self) -> &'static str {
        match self.mode {
            SniffMode::Full => "sniff",
            SniffMode::ContentOnly => "sniff-content",
        }
    }

    #[instrument(level = "debug", skip(self), fields(detector = self.name()))]
    async fn detect(&self, path: &Path) -> CoreResult<Detection> {
        let owned: PathBuf = path.to_path_buf();
        let head = tokio::task::spawn_blocking(move || Self::read_head(&owned))
            .await?
            .map_err(|e| CoreError::detection_failed(path, &e.to_string()))?;

        let mime = self.classify(path, &head);
        debug!(mime = %mime, head_len = head.len(), "sniffed");

        Ok(Detection {
            mime,
            head: Some(head),
        })
    }
}

/// Match magic bytes in `head`.
#[must_use]
pub fn sniff_magic(head: &[u8]) -> Option<&'static str> {
    if let Some(mime) = MAGIC
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
        .map(|(_, mime)| *mime)
    {
        return Some(mime);
    }

    if head.get(4..8) == Some(&b"ftyp"[..]) {
        return Some("video/mp4");
    }

    if head.starts_with(b"RIFF") && head.get(8..12) == Some(&b"WEBP"[..]) {
        return Some("image/webp");
    }

    if head.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5) == Some(&b"ustar"[..]) {
        return Some("application/x-tar");
    }

    None
}

/// UTF-8 without NUL bytes; a multi-byte char cut at the end of the head
/// still counts.
#[must_use]
pub fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }

    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// `file --mime-type -b`
#[derive(Debug, Clone)]
pub struct FileCommandDetector {
    executable: String,
    timeout: Duration,
}

impl FileCommandDetector {
    #[must_use]
    pub fn new(executable: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MimeDetector for FileCommandDetector {
    fn name(&self) -> &'static str {
        "file(1)"
    }

    #[instrument(level = "debug", skip(self), fields(command = %self.executable))]
    async fn detect(&self, path: &Path) -> CoreResult<Detection> {
        let args: [&OsStr; 4] = [
            OsStr::new("--mime-type"),
            OsStr::new("-b"),
            OsStr::new("--"),
            path.as_os_str(),
        ];
        let output = run_tool(OsStr::new(&self.executable), args, self.timeout).await?;

        let mime = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if mime.is_empty() || !mime.contains('/') {
            return Err(CoreError::detection_failed(path, "no MIME type reported"));
        }

        Ok(Detection { mime, head: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(bytes).expect("write");
        path
    }

    #[test]
    fn test_magic_signatures() {
        assert_eq!(sniff_magic(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(sniff_magic(b"PK\x03\x04rest"), Some("application/zip"));
        assert_eq!(sniff_magic(b"\x89PNG\r\n\x1a\n...."), Some("image/png"));
        assert_eq!(sniff_magic(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_magic(b"plain words"), None);

        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(sniff_magic(&tar), Some("application/x-tar"));
    }

    #[test]
    fn test_text_heuristic() {
        assert!(looks_like_text(b"hello\nworld"));
        assert!(looks_like_text(b""));
        // "é" cut after its first byte
        assert!(looks_like_text(&[b'a', 0xc3]));
        assert!(!looks_like_text(&[0xff, 0xfe, 0x00, 0x41]));
        assert!(!looks_like_text(b"nul\0inside"));
    }

    #[tokio::test]
    async fn test_extension_used_before_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "main.rs", b"fn main() {}\n");

        let detection = SniffDetector::new().detect(&path).await.expect("detect");

        assert_eq!(detection.mime, "text/x-rust");
        assert_eq!(detection.head.as_deref(), Some(&b"fn main() {}\n"[..]));
    }

    #[tokio::test]
    async fn test_content_only_ignores_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "fake.png", b"just text");

        let full = SniffDetector::new().detect(&path).await.expect("detect");
        let content = SniffDetector::content_only()
            .detect(&path)
            .await
            .expect("detect");

        assert_eq!(full.mime, "image/png");
        assert_eq!(content.mime, "text/plain");
    }

    #[tokio::test]
    async fn test_missing_file_is_detection_failure() {
        let err = SniffDetector::new()
            .detect(Path::new("/definitely/not/here.txt"))
            .await
            .expect_err("missing file");

        assert!(matches!(err, CoreError::DetectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_command_is_external_tool_error() {
        let detector = FileCommandDetector::new("glimpse-no-such-file-cmd", Duration::from_secs(1));
        let err = detector
            .detect(Path::new("Cargo.toml"))
            .await
            .expect_err("missing executable");

        assert!(matches!(err, CoreError::ExternalTool { .. }));
    }
}
