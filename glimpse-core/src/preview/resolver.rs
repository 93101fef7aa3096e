//! Path → [`PreviewResult`] resolution.
//!
//! Everything here runs on a worker task. Recoverable collaborator failures
//! become placeholders; only [`Superseded`](crate::error::CoreError::Superseded)
//! and unexpected errors leave [`Resolver::resolve`] as `Err`.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, instrument, warn};

use super::{
    archive::{ArchiveLister, LocalArchiveLister},
    events::{Notification, PreviewEvent},
    image_probe::{self, UNRENDERABLE_IMAGE},
    mime::{FileCommandDetector, MimeDetector, SniffDetector, TEXT_PLAIN, looks_like_text},
    model::{FolderEntry, PreviewContent, PreviewKind, PreviewRequest, PreviewResult, PreviewType},
    pdf::{PdfRasterizer, PopplerRasterizer},
    rules::RuleTarget,
    text::{self, BatHighlighter, Highlighter, TextRead},
    ticket::Ticket,
};
use crate::{
    cache::page_cache::{PageCache, PageKey},
    config::PreviewConfig,
    error::CoreResult,
};

pub const HIGHLIGHTER_TITLE: &str = "Plugins: Bat";

/// Collaborators consulted during resolution.
#[derive(Clone)]
pub struct PreviewServices {
    pub detector: Arc<dyn MimeDetector>,
    /// Consulted when a rule says `remime`
    pub fallback_detector: Arc<dyn MimeDetector>,
    pub archives: Arc<dyn ArchiveLister>,
    /// `None` when PDF rasterization is disabled
    pub pdf: Option<Arc<dyn PdfRasterizer>>,
    /// `None` when no external highlighter is enabled
    pub highlighter: Option<Arc<dyn Highlighter>>,
}

impl PreviewServices {
    #[must_use]
    pub fn from_config(config: &PreviewConfig) -> Self {
        let (detector, fallback_detector): (Arc<dyn MimeDetector>, Arc<dyn MimeDetector>) =
            if config.file_one.enabled {
                (
                    Arc::new(FileCommandDetector::new(
                        config.file_one.executable.clone(),
                        config.file_one.timeout,
                    )),
                    Arc::new(SniffDetector::new()),
                )
            } else {
                (
                    Arc::new(SniffDetector::new()),
                    Arc::new(SniffDetector::content_only()),
                )
            };

        let pdf = config
            .poppler
            .enabled
            .then(|| Arc::new(PopplerRasterizer::new(config.poppler.clone())) as Arc<dyn PdfRasterizer>);

        let highlighter = config.bat.enabled.then(|| {
            Arc::new(BatHighlighter::new(
                config.bat.executable.clone(),
                config.bat.timeout,
                config.show_line_numbers,
            )) as Arc<dyn Highlighter>
        });

        Self {
            detector,
            fallback_detector,
            archives: Arc::new(LocalArchiveLister),
            pdf,
            highlighter,
        }
    }
}

impl std::fmt::Debug for PreviewServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewServices")
            .field("detector", &self.detector.name())
            .field("fallback_detector", &self.fallback_detector.name())
            .field("pdf", &self.pdf.is_some())
            .field("highlighter", &self.highlighter.as_ref().map(|h| h.name()))
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Resolver {
    config: Arc<PreviewConfig>,
    services: PreviewServices,
    pages: PageCache,
}

/// Unwrap `Ok`; a recoverable error returns `Ok($fallback)`, anything else propagates.
macro_rules! recover {
    ($result:expr, $err:ident => $fallback:expr) => {
        match $result {
            Ok(value) => value,
            Err($err) if $err.is_recoverable() => return Ok($fallback),
            Err($err) => return Err($err),
        }
    };
}

impl Resolver {
    #[must_use]
    pub fn new(config: Arc<PreviewConfig>, services: PreviewServices) -> Self {
        let pages = PageCache::with_config(&config.cache);

        Self {
            config,
            services,
            pages,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<PreviewConfig> {
        &self.config
    }

    #[must_use]
    pub const fn pages(&self) -> &PageCache {
        &self.pages
    }

    /// Resolve one request. `events` receives notifications raised on the way.
    #[instrument(level = "debug", skip_all, fields(path = %request.path.display(), generation = request.generation))]
    pub async fn resolve(
        &self,
        request: &PreviewRequest,
        ticket: &Ticket,
        events: &UnboundedSender<PreviewEvent>,
    ) -> CoreResult<PreviewResult> {
        let path = request.path.as_path();
        ticket.checkpoint()?;

        let is_dir = tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_dir());
        ticket.checkpoint()?;

        if is_dir {
            return self.folder(path, ticket).await;
        }

        let (kind, mime) = match self.resolve_kind(path, ticket).await? {
            Ok(resolved) => resolved,
            Err(placeholder) => return Ok(placeholder),
        };
        debug!(?kind, mime = %mime, "resolved preview kind");

        let result = match kind {
            PreviewKind::Folder => self.folder(path, ticket).await?,
            PreviewKind::Image => self.image(path).await?,
            PreviewKind::Pdf => self.pdf(path, ticket).await?,
            PreviewKind::Archive => self.archive(path, ticket).await?,
            PreviewKind::Text => self.text(request, ticket, events).await?,
        };
        ticket.checkpoint()?;

        Ok(result.with_mime(Some(mime)))
    }

    /// The preview kind and MIME string, or the placeholder to commit.
    async fn resolve_kind(
        &self,
        path: &Path,
        ticket: &Ticket,
    ) -> CoreResult<Result<(PreviewKind, String), PreviewResult>> {
        let error = |mime: Option<String>| {
            Err(PreviewResult::placeholder(path, PreviewType::Error, &self.config.texts).with_mime(mime))
        };

        let detected = self.services.detector.detect(path).await;
        ticket.checkpoint()?;

        let detection = match detected {
            Ok(detection) => detection,
            Err(e) if e.is_recoverable() => {
                warn!(
                    marker = "PREVIEW_DETECTION",
                    operation_type = e.operation_type(),
                    detector = self.services.detector.name(),
                    error = %e,
                    "MIME detection failed"
                );
                return Ok(error(None));
            }
            Err(e) => return Err(e),
        };

        match self.config.rules.resolve(&detection.mime) {
            Ok(RuleTarget::Remime) => {}
            Ok(target) => {
                return Ok(target
                    .kind()
                    .map(|kind| (kind, detection.mime.clone()))
                    .ok_or_else(|| {
                        PreviewResult::placeholder(path, PreviewType::Error, &self.config.texts)
                    }));
            }
            Err(e) => {
                // Extension guesses such as `.ts` → MPEG-TS land here for source files
                let text_kind = detection
                    .head
                    .as_deref()
                    .filter(|head| looks_like_text(head))
                    .and_then(|_| self.config.rules.lookup(TEXT_PLAIN))
                    .and_then(RuleTarget::kind);

                if let Some(kind) = text_kind {
                    debug!(mime = %detection.mime, "no preview rule, content decodes as text");
                    return Ok(Ok((kind, TEXT_PLAIN.to_string())));
                }

                debug!(operation_type = e.operation_type(), error = %e, "no preview");
                return Ok(error(Some(detection.mime)));
            }
        }

        debug!(
            mime = %detection.mime,
            fallback = self.services.fallback_detector.name(),
            "remime"
        );
        let redetected = self.services.fallback_detector.detect(path).await;
        ticket.checkpoint()?;

        let mime = match redetected {
            Ok(detection) => detection.mime,
            Err(e) if e.is_recoverable() => return Ok(error(Some(detection.mime))),
            Err(e) => return Err(e),
        };

        Ok(match self.config.rules.resolve(&mime).map(RuleTarget::kind) {
            Ok(Some(kind)) => Ok((kind, mime)),
            Ok(None) => error(Some(mime)),
            Err(e) => {
                debug!(operation_type = e.operation_type(), error = %e, "no preview after remime");
                error(Some(mime))
            }
        })
    }

    async fn folder(&self, path: &Path, ticket: &Ticket) -> CoreResult<PreviewResult> {
        let owned: PathBuf = path.to_path_buf();
        let limit = self.config.max_folder_entries;
        let listing_ticket = ticket.clone();

        let entries = recover!(
            tokio::task::spawn_blocking(move || list_folder(&owned, limit, &listing_ticket)).await?,
            e => PreviewResult::placeholder(path, PreviewType::Error, &self.config.texts)
        );

        Ok(PreviewResult::new(
            path,
            PreviewType::Folder,
            PreviewContent::Folder(entries),
        ))
    }

    async fn image(&self, path: &Path) -> CoreResult<PreviewResult> {
        let handle = recover!(
            image_probe::probe(path).await,
            e => PreviewResult::message(path, UNRENDERABLE_IMAGE)
        );

        Ok(PreviewResult::new(
            path,
            PreviewType::Image,
            PreviewContent::Image(handle),
        ))
    }

    async fn pdf(&self, path: &Path, ticket: &Ticket) -> CoreResult<PreviewResult> {
        let Some(rasterizer) = self.services.pdf.as_ref() else {
            return Ok(PreviewResult::placeholder(
                path,
                PreviewType::Error,
                &self.config.texts,
            ));
        };

        let key = PageKey::for_path(path).await;
        ticket.checkpoint()?;

        let pages = recover!(
            self.pages
                .get_or_load(key, || rasterizer.rasterize(path, ticket))
                .await,
            e => PreviewResult::placeholder(path, PreviewType::Error, &self.config.texts)
        );

        Ok(PreviewResult::new(
            path,
            PreviewType::Pdf,
            PreviewContent::Pdf(pages),
        ))
    }

    async fn archive(&self, path: &Path, ticket: &Ticket) -> CoreResult<PreviewResult> {
        let members = match self.services.archives.list(path, ticket).await {
            Ok(members) => members,
            Err(e) if e.is_recoverable() => {
                warn!(
                    marker = "PREVIEW_ARCHIVE",
                    operation_type = e.operation_type(),
                    error = %e,
                    "archive listing failed"
                );
                vec![self.config.texts.error.clone()]
            }
            Err(e) => return Err(e),
        };

        Ok(PreviewResult::new(
            path,
            PreviewType::Archive,
            PreviewContent::Archive(members),
        ))
    }

    async fn text(
        &self,
        request: &PreviewRequest,
        ticket: &Ticket,
        events: &UnboundedSender<PreviewEvent>,
    ) -> CoreResult<PreviewResult> {
        let path = request.path.as_path();

        let body = match text::read_bounded(path, self.config.max_preview_bytes).await {
            TextRead::Body(body) => body,
            TextRead::Placeholder(kind) => {
                return Ok(PreviewResult::placeholder(path, kind, &self.config.texts));
            }
        };
        ticket.checkpoint()?;

        if let Some(highlighter) = &self.services.highlighter {
            let highlighted = highlighter.highlight(path, request.bounds).await;
            ticket.checkpoint()?;

            match highlighted {
                Ok(mut styled) => {
                    text::clip_styled(&mut styled, request.bounds);
                    return Ok(PreviewResult::new(
                        path,
                        PreviewType::Text,
                        PreviewContent::Styled(styled),
                    ));
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        marker = "PREVIEW_HIGHLIGHTER",
                        operation_type = e.operation_type(),
                        highlighter = highlighter.name(),
                        error = %e,
                        "highlighter failed, falling back to plain text"
                    );

                    let event = PreviewEvent::Notify {
                        generation: ticket.generation(),
                        notification: Notification::warning(HIGHLIGHTER_TITLE, e.to_string()),
                    };
                    if events.send(event).is_err() {
                        debug!("event receiver dropped");
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PreviewResult::new(
            path,
            PreviewType::Text,
            PreviewContent::Text {
                body: request.bounds.apply(&body),
                language: text::language_for(path),
            },
        ))
    }
}

/// Directories first, then case-insensitive name order, at most `limit` entries.
pub fn list_folder(path: &Path, limit: usize, ticket: &Ticket) -> CoreResult<Vec<FolderEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(path)? {
        ticket.checkpoint()?;

        let entry = entry?;
        entries.push(FolderEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.path().is_dir(),
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
    entries.truncate(limit);

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::preview::{
        mime::Detection,
        model::RenderBounds,
        rules::MimeRules,
        ticket::GenerationCounter,
    };
    use ansi_to_tui::IntoText;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use ratatui::{style::Color, text::Text};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FixedDetector {
        mime: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MimeDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn detect(&self, _path: &Path) -> CoreResult<Detection> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(Detection {
                mime: self.mime.to_string(),
                head: None,
            })
        }
    }

    struct FailingHighlighter;

    #[async_trait]
    impl Highlighter for FailingHighlighter {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn highlight(&self, _path: &Path, _bounds: RenderBounds) -> CoreResult<Text<'static>> {
            Err(CoreError::external_tool("bat", "not installed"))
        }
    }

    /// Returns bat-like output, ignoring the bounds it is given.
    struct AnsiHighlighter;

    #[async_trait]
    impl Highlighter for AnsiHighlighter {
        fn name(&self) -> &'static str {
            "ansi"
        }

        async fn highlight(&self, _path: &Path, _bounds: RenderBounds) -> CoreResult<Text<'static>> {
            b"\x1b[31mfn\x1b[0m main() { println!(\"a rather long line\"); }\n\x1b[32m// two\x1b[0m\n// three\n"
                .to_vec()
                .into_text()
                .map_err(CoreError::other)
        }
    }

    fn services(detector: Arc<FixedDetector>, fallback: Arc<FixedDetector>) -> PreviewServices {
        PreviewServices {
            detector,
            fallback_detector: fallback,
            archives: Arc::new(LocalArchiveLister),
            pdf: None,
            highlighter: None,
        }
    }

    fn request(path: &Path) -> PreviewRequest {
        PreviewRequest {
            path: path.to_path_buf(),
            generation: 1,
            bounds: RenderBounds {
                max_lines: Some(2),
                max_width: Some(80),
            },
        }
    }

    fn current_ticket() -> Ticket {
        let counter = GenerationCounter::new();
        counter.ticket(counter.advance())
    }

    #[tokio::test]
    async fn test_folder_listing_order_and_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("zeta")).expect("dir");
        std::fs::write(dir.path().join("Alpha.txt"), "a").expect("file");
        std::fs::write(dir.path().join("beta.txt"), "b").expect("file");

        let entries = list_folder(dir.path(), 2, &current_ticket()).expect("list");

        assert_eq!(
            entries,
            vec![
                FolderEntry {
                    name: "zeta".into(),
                    is_dir: true
                },
                FolderEntry {
                    name: "Alpha.txt".into(),
                    is_dir: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_remime_consults_fallback_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mystery");
        std::fs::write(&path, "plain words\nmore words\nthird\n").expect("write");

        let mut table = IndexMap::new();
        table.insert("application/octet-stream".to_string(), RuleTarget::Remime);
        table.insert("text/*".to_string(), RuleTarget::Text);
        let config = PreviewConfig {
            rules: crate::preview::rules::MimeRules::compile(&table).expect("rules"),
            ..PreviewConfig::default()
        };

        let primary = Arc::new(FixedDetector {
            mime: "application/octet-stream",
            ..FixedDetector::default()
        });
        let fallback = Arc::new(FixedDetector {
            mime: "text/plain",
            ..FixedDetector::default()
        });
        let resolver = Resolver::new(
            Arc::new(config),
            services(Arc::clone(&primary), Arc::clone(&fallback)),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = resolver
            .resolve(&request(&path), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert_eq!(result.preview_type, PreviewType::Text);
        assert_eq!(result.text(), Some("plain words\nmore words"));
        assert_eq!(result.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(primary.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(fallback.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_remime_is_error_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mystery");
        std::fs::write(&path, "x").expect("write");

        let mut table = IndexMap::new();
        table.insert("application/octet-stream".to_string(), RuleTarget::Remime);
        let config = PreviewConfig {
            rules: crate::preview::rules::MimeRules::compile(&table).expect("rules"),
            ..PreviewConfig::default()
        };
        let detector = Arc::new(FixedDetector {
            mime: "application/octet-stream",
            ..FixedDetector::default()
        });
        let resolver = Resolver::new(
            Arc::new(config),
            services(Arc::clone(&detector), Arc::clone(&detector)),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = resolver
            .resolve(&request(&path), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert_eq!(result.preview_type, PreviewType::Error);
        assert_eq!(detector.calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unmapped_mime_is_error_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, "x").expect("write");

        let detector = Arc::new(FixedDetector {
            mime: "video/mp4",
            ..FixedDetector::default()
        });
        let resolver = Resolver::new(
            Arc::new(PreviewConfig::default()),
            services(Arc::clone(&detector), detector),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = resolver
            .resolve(&request(&path), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert_eq!(result.preview_type, PreviewType::Error);
        assert_eq!(result.mime_type.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn test_highlighter_failure_warns_and_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "fn main() {}\n// two\n// three\n").expect("write");

        let detector = Arc::new(FixedDetector {
            mime: "text/x-rust",
            ..FixedDetector::default()
        });
        let mut services = services(Arc::clone(&detector), detector);
        services.highlighter = Some(Arc::new(FailingHighlighter));
        let resolver = Resolver::new(Arc::new(PreviewConfig::default()), services);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = resolver
            .resolve(&request(&path), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert!(matches!(
            result.content,
            PreviewContent::Text {
                language: Some("rust"),
                ..
            }
        ));
        assert_eq!(result.text(), Some("fn main() {}\n// two"));

        let Some(PreviewEvent::Notify { notification, .. }) = rx.recv().await else {
            panic!("expected a warning notification");
        };
        assert_eq!(notification.title, HIGHLIGHTER_TITLE);
        assert_eq!(
            notification.level,
            crate::preview::events::NotificationLevel::Warning
        );
    }

    #[tokio::test]
    async fn test_highlighted_text_is_clipped_to_bounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "fn main() {}\n").expect("write");

        let detector = Arc::new(FixedDetector {
            mime: "text/x-rust",
            ..FixedDetector::default()
        });
        let mut services = services(Arc::clone(&detector), detector);
        services.highlighter = Some(Arc::new(AnsiHighlighter));
        let resolver = Resolver::new(Arc::new(PreviewConfig::default()), services);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut narrow = request(&path);
        narrow.bounds.max_width = Some(10);
        let result = resolver
            .resolve(&narrow, &current_ticket(), &tx)
            .await
            .expect("resolve");

        let PreviewContent::Styled(text) = &result.content else {
            panic!("expected styled content, got {:?}", result.content);
        };
        assert_eq!(text.lines.len(), 2);
        for line in &text.lines {
            let width: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
            assert!(width <= 10, "line too wide: {line:?}");
        }
        assert!(text.lines[0].spans.iter().any(|s| s.style.fg == Some(Color::Red)));
        assert_eq!(result.preview_type, PreviewType::Text);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unmapped_guess_with_text_content_previews_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ts = dir.path().join("index.ts");
        let sql = dir.path().join("schema.sql");
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&ts, "export const x: number = 1;\n").expect("write");
        std::fs::write(&sql, "select 1;\n").expect("write");
        std::fs::write(&clip, b"\0\0\0\x18ftypmp42\0\0\0\0").expect("write");

        let config = Arc::new(PreviewConfig::default());
        let mut services = PreviewServices::from_config(&config);
        services.highlighter = None;
        let resolver = Resolver::new(config, services);
        let (tx, _rx) = mpsc::unbounded_channel();

        let ts_result = resolver
            .resolve(&request(&ts), &current_ticket(), &tx)
            .await
            .expect("resolve");
        assert_eq!(ts_result.preview_type, PreviewType::Text);
        assert_eq!(ts_result.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(ts_result.text(), Some("export const x: number = 1;"));
        assert!(matches!(
            ts_result.content,
            PreviewContent::Text {
                language: Some("typescript"),
                ..
            }
        ));

        let sql_result = resolver
            .resolve(&request(&sql), &current_ticket(), &tx)
            .await
            .expect("resolve");
        assert_eq!(sql_result.text(), Some("select 1;"));

        let clip_result = resolver
            .resolve(&request(&clip), &current_ticket(), &tx)
            .await
            .expect("resolve");
        assert_eq!(clip_result.preview_type, PreviewType::Error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_command_primary_remimes_through_sniffer() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-file");
        std::fs::write(&script, "#!/bin/sh\necho application/octet-stream\n").expect("write");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        let notes = dir.path().join("notes.md");
        std::fs::write(&notes, "# title\nbody\nmore\n").expect("write");

        let mut table = MimeRules::default_table();
        table.insert("application/octet-stream".to_string(), RuleTarget::Remime);
        let mut config = PreviewConfig {
            rules: MimeRules::compile(&table).expect("rules"),
            ..PreviewConfig::default()
        };
        config.file_one.enabled = true;
        config.file_one.executable = script.display().to_string();
        config.bat.enabled = false;

        let services = PreviewServices::from_config(&config);
        assert_eq!(services.detector.name(), "file(1)");
        assert_eq!(services.fallback_detector.name(), "sniff");

        let resolver = Resolver::new(Arc::new(config), services);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = resolver
            .resolve(&request(&notes), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert_eq!(result.preview_type, PreviewType::Text);
        assert!(result.mime_type.as_deref().is_some_and(|m| m.starts_with("text/")));
        assert_eq!(result.text(), Some("# title\nbody"));
    }

    #[tokio::test]
    async fn test_corrupt_archive_lists_error_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04garbage").expect("write");

        let detector = Arc::new(FixedDetector {
            mime: "application/zip",
            ..FixedDetector::default()
        });
        let config = Arc::new(PreviewConfig::default());
        let resolver = Resolver::new(Arc::clone(&config), services(Arc::clone(&detector), detector));
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = resolver
            .resolve(&request(&path), &current_ticket(), &tx)
            .await
            .expect("resolve");

        assert_eq!(result.preview_type, PreviewType::Archive);
        match result.content {
            PreviewContent::Archive(members) => assert_eq!(members, vec![config.texts.error.clone()]),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_superseded_request_is_err() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").expect("write");

        let detector = Arc::new(FixedDetector {
            mime: "text/plain",
            ..FixedDetector::default()
        });
        let resolver = Resolver::new(
            Arc::new(PreviewConfig::default()),
            services(Arc::clone(&detector), detector),
        );
        let counter = GenerationCounter::new();
        let stale = counter.ticket(counter.advance());
        counter.advance();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = resolver
            .resolve(&request(&path), &stale, &tx)
            .await
            .expect_err("stale");

        assert!(err.is_superseded());
    }
}
