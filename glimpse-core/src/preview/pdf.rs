//! PDF rasterization through poppler and the surface-side paging state.

use std::{
    ffi::OsString,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use super::{model::PageImage, ticket::Ticket};
use crate::{
    cache::page_cache::Pages,
    config::PopplerPlugin,
    error::{CoreError, CoreResult},
    util::process::run_tool,
};

#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    /// Every page of `path`, in page order.
    async fn rasterize(&self, path: &Path, ticket: &Ticket) -> CoreResult<Vec<PageImage>>;
}

/// `pdfinfo` for the page count, then `pdftoppm` or `pdftocairo` per range.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    config: PopplerPlugin,
}

impl PopplerRasterizer {
    #[must_use]
    pub const fn new(config: PopplerPlugin) -> Self {
        Self { config }
    }

    fn program(&self, name: &str) -> OsString {
        if self.config.poppler_folder.is_empty() {
            OsString::from(name)
        } else {
            Path::new(&self.config.poppler_folder)
                .join(name)
                .into_os_string()
        }
    }

    fn renderer(&self) -> OsString {
        if self.config.use_pdftocairo {
            self.program("pdftocairo")
        } else {
            self.program("pdftoppm")
        }
    }

    async fn page_count(&self, path: &Path) -> CoreResult<usize> {
        let output = run_tool(
            &self.program("pdfinfo"),
            [path.as_os_str()],
            self.config.timeout,
        )
        .await?;

        parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| CoreError::decode(path, "pdfinfo reported no page count"))
    }

    async fn render_range(
        &self,
        path: &Path,
        pages: RangeInclusive<usize>,
        out_dir: &Path,
    ) -> CoreResult<()> {
        let prefix = out_dir.join(format!("r{}", pages.start()));

        let args: Vec<OsString> = vec![
            "-png".into(),
            "-r".into(),
            self.config.resolution.to_string().into(),
            "-f".into(),
            pages.start().to_string().into(),
            "-l".into(),
            pages.end().to_string().into(),
            path.as_os_str().to_os_string(),
            prefix.into_os_string(),
        ];

        run_tool(&self.renderer(), args, self.config.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl PdfRasterizer for PopplerRasterizer {
    #[instrument(level = "debug", skip(self, ticket), fields(generation = ticket.generation()))]
    async fn rasterize(&self, path: &Path, ticket: &Ticket) -> CoreResult<Vec<PageImage>> {
        ticket.checkpoint()?;
        let total = self.page_count(path).await?;
        ticket.checkpoint()?;

        if total == 0 {
            return Ok(Vec::new());
        }

        let out_dir = tempfile::Builder::new().prefix("glimpse-pdf").tempdir()?;
        let ranges = split_pages(total, self.config.threads);
        debug!(total, ranges = ranges.len(), "rasterizing");

        try_join_all(
            ranges
                .into_iter()
                .map(|range| self.render_range(path, range, out_dir.path())),
        )
        .await?;
        ticket.checkpoint()?;

        let dir = out_dir.path().to_path_buf();
        let source = path.to_path_buf();
        let decode_ticket = ticket.clone();
        let pages =
            tokio::task::spawn_blocking(move || decode_pages(&source, &dir, &decode_ticket))
                .await??;

        info!(
            marker = "PDF_RASTERIZED",
            operation_type = "pdf_rasterize",
            path = %path.display(),
            pages = pages.len(),
            "document rasterized"
        );

        Ok(pages)
    }
}

fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}

/// Split `1..=total` into at most `threads` contiguous ranges.
fn split_pages(total: usize, threads: usize) -> Vec<RangeInclusive<usize>> {
    let workers = threads.clamp(1, total.max(1));
    let chunk = total.div_ceil(workers);

    (0..workers)
        .map(|i| (i * chunk + 1)..=((i + 1) * chunk).min(total))
        .filter(|range| range.start() <= range.end())
        .collect()
}

/// Page number encoded by poppler as the trailing `-N` of the file stem.
fn page_number(file: &Path) -> Option<usize> {
    file.file_stem()?
        .to_str()?
        .rsplit_once('-')
        .and_then(|(_, n)| n.parse().ok())
}

fn decode_pages(source: &Path, dir: &Path, ticket: &Ticket) -> CoreResult<Vec<PageImage>> {
    let mut files: Vec<(usize, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|file| file.extension().is_some_and(|ext| ext == "png"))
        .filter_map(|file| page_number(&file).map(|n| (n, file)))
        .collect();
    files.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(files.len());
    for (index, (_, file)) in files.into_iter().enumerate() {
        ticket.checkpoint()?;

        let image = image::open(&file).map_err(|e| CoreError::decode(source, e))?;
        pages.push(PageImage {
            index,
            image: Arc::new(image),
        });
    }

    Ok(pages)
}

// ────────────────────────────────────────────────────────────────────────────
// Paging
// ────────────────────────────────────────────────────────────────────────────

/// Paging state of the displayed PDF. Owned by the surface.
#[derive(Debug, Clone, Default)]
pub struct PdfState {
    path: Option<PathBuf>,
    current_page: usize,
    pages: Option<Pages>,
}

impl PdfState {
    /// Adopt `pages` for `path`; the page index survives only if the path is unchanged.
    pub fn load(&mut self, path: &Path, pages: Pages) {
        if self.path.as_deref() != Some(path) {
            self.path = Some(path.to_path_buf());
            self.current_page = 0;
        }
        self.current_page = self.current_page.min(pages.len().saturating_sub(1));
        self.pages = Some(pages);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.pages.as_ref().map_or(0, |pages| pages.len())
    }

    #[must_use]
    pub fn current(&self) -> Option<&PageImage> {
        self.pages.as_ref()?.get(self.current_page)
    }

    /// Returns `false` at the last page.
    pub fn next_page(&mut self) -> bool {
        if self.current_page + 1 < self.total_pages() {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    /// Returns `false` at the first page.
    pub fn prev_page(&mut self) -> bool {
        if self.current_page > 0 && self.total_pages() > 0 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }
}
