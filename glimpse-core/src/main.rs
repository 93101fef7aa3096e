//! src/main.rs
//! `glimpse`: rank candidates from stdin, or resolve previews headless.

use std::{
    io::{self, BufRead, Write},
    panic::PanicHookInfo,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use glimpse_core::{
    Logger,
    config::{Config, PreviewConfig},
    preview::{
        PreviewContent, PreviewPipeline, PreviewSurface, SurfaceUpdate, Viewport,
        events::NotificationLevel,
    },
    rank, score,
};

#[derive(Debug, Parser)]
#[command(name = "glimpse", version, about = "Fuzzy ranking and file previews")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `logging.log_level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rank newline-separated candidates read from stdin
    Score {
        query: String,

        /// Keep candidates that do not match
        #[arg(long)]
        all: bool,
    },

    /// Request previews for each path in quick succession and print the one committed
    Preview {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, default_value_t = 80)]
        width: u16,

        #[arg(long, default_value_t = 24)]
        height: u16,

        /// Seconds to wait for the preview to commit
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_panic_handler();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().await.context("Failed to load config")?,
    };

    let mut logger = Logger::builder().with_config(config.logging.clone());
    if let Some(level) = &cli.log_level {
        logger = logger.with_level(level);
    }
    let _guard = logger.init().context("Failed to initialize logging")?;

    match cli.command {
        Command::Score { query, all } => run_score(&query, all),
        Command::Preview {
            paths,
            width,
            height,
            timeout,
        } => {
            run_preview(
                &config,
                paths,
                Viewport::new(width, height),
                Duration::from_secs(timeout),
            )
            .await
        }
    }
}

fn run_score(query: &str, all: bool) -> Result<()> {
    let candidates: Vec<String> = io::stdin()
        .lock()
        .lines()
        .collect::<io::Result<_>>()
        .context("Failed to read candidates from stdin")?;

    let mut out = io::stdout().lock();

    if all {
        let mut scored: Vec<(f64, &str)> = candidates
            .iter()
            .map(|c| (score(query, c), c.as_str()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (value, candidate) in scored {
            writeln!(out, "{value:.4}\t{candidate}")?;
        }
    } else {
        for ranked in rank(query, candidates.iter(), |c| c.as_str()) {
            writeln!(out, "{:.4}\t{}", ranked.score, ranked.item)?;
        }
    }

    Ok(())
}

async fn run_preview(
    config: &Config,
    paths: Vec<PathBuf>,
    viewport: Viewport,
    wait: Duration,
) -> Result<()> {
    let preview_config =
        Arc::new(PreviewConfig::from_config(config).context("Invalid preview configuration")?);
    info!(
        max_preview_bytes = %ByteSize::b(preview_config.max_preview_bytes),
        preview_full = preview_config.preview_full,
        "starting headless preview"
    );

    let (pipeline, mut events) = PreviewPipeline::from_config(preview_config, viewport)
        .context("Failed to start preview pipeline")?;
    let mut surface = PreviewSurface::for_pipeline(&pipeline);

    for path in paths {
        pipeline.show_preview(path);
    }

    let committed = tokio::time::timeout(wait, async {
        while let Some(event) = events.recv().await {
            if matches!(
                surface.apply(event),
                SurfaceUpdate::Committed | SurfaceUpdate::Failed
            ) {
                return true;
            }
        }
        false
    })
    .await
    .context("Timed out waiting for the preview")?;

    for notification in surface.take_notifications() {
        let level = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "ok",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{level}] {}: {}", notification.title, notification.message);
    }

    let Some(result) = surface.current().filter(|_| committed) else {
        anyhow::bail!("Preview pipeline stopped before committing a result");
    };

    let mut out = io::stdout().lock();
    let title = result.preview_type.title();
    if !title.is_empty() {
        writeln!(out, "── {title}: {} ──", result.path.display())?;
    }
    if let Some(mime) = &result.mime_type {
        writeln!(out, "mime: {mime}")?;
    }

    match &result.content {
        PreviewContent::Folder(entries) => {
            for entry in entries {
                let suffix = if entry.is_dir { "/" } else { "" };
                writeln!(out, "{}{suffix}", entry.name)?;
            }
        }
        PreviewContent::Image(handle) => {
            writeln!(out, "{:?} {}x{}", handle.format, handle.width, handle.height)?;
        }
        PreviewContent::Pdf(pages) => {
            writeln!(out, "{} page(s)", pages.len())?;
            if let Some(page) = surface.pdf().current() {
                writeln!(
                    out,
                    "page {}: {}x{}",
                    page.index + 1,
                    page.image.width(),
                    page.image.height()
                )?;
            }
        }
        PreviewContent::Archive(members) => {
            for member in members {
                writeln!(out, "{member}")?;
            }
        }
        PreviewContent::Text { body, .. } => writeln!(out, "{body}")?,
        PreviewContent::Styled(text) => {
            for line in &text.lines {
                let plain: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
                writeln!(out, "{plain}")?;
            }
        }
        PreviewContent::Placeholder(text) => writeln!(out, "{text}")?,
    }

    Ok(())
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        error!("Application panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
