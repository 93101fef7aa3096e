//! Requests, results and the content variants a preview can carry.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::config::PreviewTextConfig;

/// Preview kinds a MIME rule can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Folder,
    Image,
    Pdf,
    Archive,
    Text,
}

/// What was committed, including the placeholder outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewType {
    Folder,
    Image,
    Pdf,
    Archive,
    Text,
    Binary,
    Error,
    Empty,
    TooLarge,
}

impl From<PreviewKind> for PreviewType {
    fn from(kind: PreviewKind) -> Self {
        match kind {
            PreviewKind::Folder => Self::Folder,
            PreviewKind::Image => Self::Image,
            PreviewKind::Pdf => Self::Pdf,
            PreviewKind::Archive => Self::Archive,
            PreviewKind::Text => Self::Text,
        }
    }
}

impl PreviewType {
    /// Title shown on the preview border.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Folder => "Folder Preview",
            Self::Image => "Image Preview",
            Self::Pdf => "PDF Preview",
            Self::Archive => "Archive Preview",
            Self::Text => "File Preview",
            Self::Binary | Self::Error | Self::Empty | Self::TooLarge => "",
        }
    }

    #[must_use]
    pub const fn is_placeholder(self) -> bool {
        matches!(self, Self::Binary | Self::Error | Self::Empty | Self::TooLarge)
    }
}

/// Viewport of the preview surface in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Columns reserved for the line-number gutter and borders.
const GUTTER_WIDTH: usize = 7;

/// Truncation bounds of the surface, shared by every text renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderBounds {
    pub max_lines: Option<usize>,
    pub max_width: Option<usize>,
}

impl RenderBounds {
    /// `preview_full` lifts both bounds.
    ///
    /// A pane no wider than the gutter gets `max_width: None`: lines are left
    /// uncut rather than clipped to nothing.
    #[must_use]
    pub fn for_viewport(viewport: Viewport, preview_full: bool) -> Self {
        if preview_full {
            return Self::unbounded();
        }

        Self {
            max_lines: Some(usize::from(viewport.height)),
            max_width: usize::from(viewport.width)
                .checked_sub(GUTTER_WIDTH)
                .filter(|w| *w > 0),
        }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_lines: None,
            max_width: None,
        }
    }

    /// Cut `body` to the visible lines and columns.
    #[must_use]
    pub fn apply(&self, body: &str) -> String {
        let lines = body.lines().take(self.max_lines.unwrap_or(usize::MAX));

        let mut out = String::with_capacity(body.len().min(8 * 1024));
        for (i, line) in lines.enumerate() {
            if i > 0 {
                out.push('\n');
            }
            match self.max_width {
                Some(width) => out.extend(line.chars().take(width)),
                None => out.push_str(line),
            }
        }
        out
    }
}

/// A pending or in-flight preview request.
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub path: PathBuf,
    pub generation: u64,
    pub bounds: RenderBounds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// One rasterized PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub index: usize,
    pub image: Arc<DynamicImage>,
}

#[derive(Debug, Clone)]
pub enum PreviewContent {
    Folder(Vec<FolderEntry>),
    Image(ImageHandle),
    Pdf(Arc<[PageImage]>),
    Archive(Vec<String>),
    Text {
        body: String,
        language: Option<&'static str>,
    },
    /// Highlighter output, already converted from ANSI.
    Styled(ratatui::text::Text<'static>),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub path: PathBuf,
    pub preview_type: PreviewType,
    pub content: PreviewContent,
    /// Diagnostic only.
    pub mime_type: Option<String>,
}

impl PreviewResult {
    #[must_use]
    pub fn new(path: &Path, preview_type: PreviewType, content: PreviewContent) -> Self {
        Self {
            path: path.to_path_buf(),
            preview_type,
            content,
            mime_type: None,
        }
    }

    /// Placeholder result for `Binary`, `Error`, `Empty` or `TooLarge`.
    #[must_use]
    pub fn placeholder(path: &Path, preview_type: PreviewType, texts: &PreviewTextConfig) -> Self {
        let text = match preview_type {
            PreviewType::Binary => &texts.binary,
            PreviewType::Empty => &texts.empty,
            PreviewType::TooLarge => &texts.too_large,
            _ => &texts.error,
        };

        Self::new(
            path,
            preview_type,
            PreviewContent::Placeholder(text.clone()),
        )
    }

    /// Error placeholder with a message of its own.
    #[must_use]
    pub fn message(path: &Path, message: impl Into<String>) -> Self {
        Self::new(
            path,
            PreviewType::Error,
            PreviewContent::Placeholder(message.into()),
        )
    }

    #[must_use]
    pub fn with_mime(mut self, mime: Option<String>) -> Self {
        self.mime_type = mime;
        self
    }

    /// Placeholder or plain text body, if the content is textual.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            PreviewContent::Placeholder(text) | PreviewContent::Text { body: text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_cut_lines_and_columns() {
        let bounds = RenderBounds::for_viewport(Viewport::new(10, 2), false);

        assert_eq!(bounds.max_width, Some(3));
        assert_eq!(bounds.apply("abcdef\nxy\nthird"), "abc\nxy");
    }

    #[test]
    fn test_narrow_viewport_keeps_width() {
        let bounds = RenderBounds::for_viewport(Viewport::new(5, 3), false);

        assert_eq!(bounds.max_width, None);
        assert_eq!(bounds.apply("wide line"), "wide line");
    }

    #[test]
    fn test_zero_height_shows_nothing() {
        let bounds = RenderBounds::for_viewport(Viewport::new(80, 0), false);

        assert_eq!(bounds.apply("one\ntwo"), "");
    }

    #[test]
    fn test_preview_full_is_unbounded() {
        let bounds = RenderBounds::for_viewport(Viewport::new(10, 1), true);

        assert_eq!(bounds, RenderBounds::unbounded());
        assert_eq!(bounds.apply("abcdefghij\nk"), "abcdefghij\nk");
    }

    #[test]
    fn test_placeholder_text_comes_from_config() {
        let texts = PreviewTextConfig::default();
        let result = PreviewResult::placeholder(Path::new("x"), PreviewType::Empty, &texts);

        assert_eq!(result.text(), Some(texts.empty.as_str()));
        assert!(result.preview_type.is_placeholder());
    }
}
