//! Text previews: bounded reading, the `bat` highlighter and language hints.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    time::Duration,
};

use ansi_to_tui::IntoText;
use async_trait::async_trait;
use ratatui::text::{Line, Text};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use super::model::{PreviewType, RenderBounds};
use crate::{
    error::{CoreError, CoreResult},
    util::process::run_tool,
};

/// Outcome of reading a file for a text preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRead {
    Body(String),
    /// `Empty`, `TooLarge`, `Binary` or `Error`
    Placeholder(PreviewType),
}

/// Read at most `max_bytes` of `path`.
///
/// The size check runs on metadata, so an oversized file is never opened.
#[instrument(level = "debug")]
pub async fn read_bounded(path: &Path, max_bytes: u64) -> TextRead {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            debug!(error = %e, "metadata unavailable");
            return TextRead::Placeholder(PreviewType::Error);
        }
    };

    if size > max_bytes {
        return TextRead::Placeholder(PreviewType::TooLarge);
    }
    if size == 0 {
        return TextRead::Placeholder(PreviewType::Empty);
    }

    let mut bytes = Vec::new();
    let read = async {
        tokio::fs::File::open(path)
            .await?
            .take(max_bytes + 1)
            .read_to_end(&mut bytes)
            .await
    };
    if let Err(e) = read.await {
        debug!(error = %e, "read failed");
        return TextRead::Placeholder(PreviewType::Error);
    }

    // Grew between the metadata call and the read
    if bytes.len() as u64 > max_bytes {
        return TextRead::Placeholder(PreviewType::TooLarge);
    }
    if bytes.is_empty() {
        return TextRead::Placeholder(PreviewType::Empty);
    }

    String::from_utf8(bytes).map_or(TextRead::Placeholder(PreviewType::Binary), TextRead::Body)
}

#[async_trait]
pub trait Highlighter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Styled rendering of `path`. `bounds` limits the work; callers still
    /// clip the result with [`clip_styled`].
    async fn highlight(&self, path: &Path, bounds: RenderBounds) -> CoreResult<Text<'static>>;
}

#[derive(Debug, Clone)]
pub struct BatHighlighter {
    executable: String,
    timeout: Duration,
    line_numbers: bool,
}

impl BatHighlighter {
    #[must_use]
    pub fn new(executable: impl Into<String>, timeout: Duration, line_numbers: bool) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            line_numbers,
        }
    }

    fn args(&self, path: &Path, bounds: RenderBounds) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--force-colorization".into(),
            "--paging=never".into(),
            if self.line_numbers {
                "--style=numbers".into()
            } else {
                "--style=plain".into()
            },
        ];

        if let Some(lines) = bounds.max_lines.filter(|n| *n > 0) {
            args.push(format!("--line-range=:{lines}").into());
        }

        args.push("--".into());
        args.push(path.as_os_str().to_os_string());
        args
    }
}

#[async_trait]
impl Highlighter for BatHighlighter {
    fn name(&self) -> &'static str {
        "bat"
    }

    #[instrument(level = "debug", skip(self), fields(command = %self.executable))]
    async fn highlight(&self, path: &Path, bounds: RenderBounds) -> CoreResult<Text<'static>> {
        if bounds.max_lines == Some(0) {
            return Ok(Text::default());
        }

        let output = run_tool(
            OsStr::new(&self.executable),
            self.args(path, bounds),
            self.timeout,
        )
        .await?;

        output
            .stdout
            .into_text()
            .map_err(|e| CoreError::decode(path, e))
    }
}

/// Apply `bounds` to already styled text.
pub fn clip_styled(text: &mut Text<'static>, bounds: RenderBounds) {
    if let Some(max_lines) = bounds.max_lines {
        text.lines.truncate(max_lines);
    }

    if let Some(width) = bounds.max_width {
        for line in &mut text.lines {
            clip_line(line, width);
        }
    }
}

fn clip_line(line: &mut Line<'static>, width: usize) {
    let mut remaining = width;

    line.spans.retain_mut(|span| {
        if remaining == 0 {
            return false;
        }

        let count = span.content.chars().count();
        if count > remaining {
            span.content = span.content.chars().take(remaining).collect::<String>().into();
            remaining = 0;
        } else {
            remaining -= count;
        }
        true
    });
}

/// Syntax name for the extension of `path`.
#[must_use]
pub fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();

    let language = match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "java" => "java",
        "rb" => "ruby",
        "sh" | "bash" | "zsh" => "bash",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        "xml" => "xml",
        "lua" => "lua",
        _ => return None,
    };

    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::text::Span;

    #[tokio::test]
    async fn test_read_outcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.txt");
        let binary = dir.path().join("blob.bin");
        let body = dir.path().join("notes.txt");
        std::fs::write(&empty, b"").expect("write");
        std::fs::write(&binary, [0xff, 0xfe, 0xfd]).expect("write");
        std::fs::write(&body, "hello\n").expect("write");

        assert_eq!(
            read_bounded(&empty, 1024).await,
            TextRead::Placeholder(PreviewType::Empty)
        );
        assert_eq!(
            read_bounded(&binary, 1024).await,
            TextRead::Placeholder(PreviewType::Binary)
        );
        assert_eq!(
            read_bounded(&body, 1024).await,
            TextRead::Body("hello\n".to_string())
        );
        assert_eq!(
            read_bounded(&dir.path().join("gone.txt"), 1024).await,
            TextRead::Placeholder(PreviewType::Error)
        );
    }

    #[tokio::test]
    async fn test_oversized_file_is_too_large() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.log");
        std::fs::write(&path, vec![b'a'; 64]).expect("write");

        assert_eq!(
            read_bounded(&path, 63).await,
            TextRead::Placeholder(PreviewType::TooLarge)
        );
        assert!(matches!(read_bounded(&path, 64).await, TextRead::Body(_)));
    }

    #[test]
    fn test_bat_arguments() {
        let bat = BatHighlighter::new("bat", Duration::from_secs(1), true);
        let args = bat.args(
            Path::new("main.rs"),
            RenderBounds {
                max_lines: Some(20),
                max_width: Some(40),
            },
        );

        assert_eq!(
            args,
            [
                "--force-colorization",
                "--paging=never",
                "--style=numbers",
                "--line-range=:20",
                "--",
                "main.rs"
            ]
            .map(OsString::from)
        );

        let unbounded = BatHighlighter::new("bat", Duration::from_secs(1), false)
            .args(Path::new("main.rs"), RenderBounds::unbounded());
        assert!(unbounded.iter().any(|a| a == "--style=plain"));
        assert!(!unbounded.iter().any(|a| a.to_string_lossy().starts_with("--line-range")));
    }

    #[test]
    fn test_clip_styled_respects_width_across_spans() {
        let mut text = Text::from(vec![
            Line::from(vec![Span::raw("abc"), Span::raw("defg")]),
            Line::from("second"),
            Line::from("third"),
        ]);

        clip_styled(
            &mut text,
            RenderBounds {
                max_lines: Some(2),
                max_width: Some(5),
            },
        );

        assert_eq!(text.lines.len(), 2);
        assert_eq!(text.lines[0].spans.len(), 2);
        assert_eq!(text.lines[0].spans[1].content, "de");
        assert_eq!(text.lines[1].spans[0].content, "secon");
    }

    #[test]
    fn test_language_hint() {
        assert_eq!(language_for(Path::new("src/lib.RS")), Some("rust"));
        assert_eq!(language_for(Path::new("Cargo.toml")), Some("toml"));
        assert_eq!(language_for(Path::new("README")), None);
    }
}
