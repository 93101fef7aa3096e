//! UI-owned preview state. Only the loop that drains [`PreviewEvent`]s
//! mutates it.

use std::{mem, path::Path};

use tracing::{debug, trace};

use super::{
    events::{Notification, PreviewEvent},
    model::{PreviewContent, PreviewResult, PreviewType, Viewport},
    pdf::PdfState,
    pipeline::PreviewPipeline,
    ticket::GenerationCounter,
};
use crate::config::PreviewTextConfig;

pub const FAILURE_TITLE: &str = "Preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfacePhase {
    #[default]
    Idle,
    Loading,
    Displayed,
}

/// What [`PreviewSurface::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUpdate {
    /// Belonged to a superseded request
    Stale,
    Loading(bool),
    Notified,
    Committed,
    Failed,
}

#[derive(Debug)]
pub struct PreviewSurface {
    counter: GenerationCounter,
    texts: PreviewTextConfig,
    phase: SurfacePhase,
    loading: bool,
    current: Option<PreviewResult>,
    pdf: PdfState,
    notifications: Vec<Notification>,
}

impl PreviewSurface {
    #[must_use]
    pub fn new(counter: GenerationCounter, texts: PreviewTextConfig) -> Self {
        Self {
            counter,
            texts,
            phase: SurfacePhase::Idle,
            loading: false,
            current: None,
            pdf: PdfState::default(),
            notifications: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_pipeline(pipeline: &PreviewPipeline) -> Self {
        Self::new(
            pipeline.generation_counter(),
            pipeline.resolver().config().texts.clone(),
        )
    }

    /// Commit `event` unless a newer request exists.
    pub fn apply(&mut self, event: PreviewEvent) -> SurfaceUpdate {
        let current = self.counter.current();
        if event.generation() != current {
            trace!(event = event.generation(), current, "dropping stale event");
            return SurfaceUpdate::Stale;
        }

        match event {
            PreviewEvent::Loading { loading, .. } => {
                self.loading = loading;
                if loading {
                    self.phase = SurfacePhase::Loading;
                }
                SurfaceUpdate::Loading(loading)
            }

            PreviewEvent::Notify { notification, .. } => {
                self.notifications.push(notification);
                SurfaceUpdate::Notified
            }

            PreviewEvent::Resolved { result, .. } => {
                self.commit(*result);
                self.phase = SurfacePhase::Displayed;
                SurfaceUpdate::Committed
            }

            PreviewEvent::Failed { path, message, .. } => {
                debug!(path = %path.display(), %message, "preview failed");
                self.commit(PreviewResult::placeholder(
                    &path,
                    PreviewType::Error,
                    &self.texts,
                ));
                self.notifications
                    .push(Notification::error(FAILURE_TITLE, message));
                self.phase = SurfacePhase::Idle;
                SurfaceUpdate::Failed
            }
        }
    }

    fn commit(&mut self, result: PreviewResult) {
        match &result.content {
            PreviewContent::Pdf(pages) => self.pdf.load(&result.path, pages.clone()),
            _ => self.pdf.reset(),
        }

        self.loading = false;
        self.current = Some(result);
    }

    #[must_use]
    pub const fn phase(&self) -> SurfacePhase {
        self.phase
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn current(&self) -> Option<&PreviewResult> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|result| result.path.as_path())
    }

    #[must_use]
    pub const fn pdf(&self) -> &PdfState {
        &self.pdf
    }

    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        mem::take(&mut self.notifications)
    }

    /// Next PDF page; no-op past the last page.
    pub fn next_page(&mut self) -> bool {
        self.pdf.next_page()
    }

    /// Previous PDF page; no-op on the first page.
    pub fn prev_page(&mut self) -> bool {
        self.pdf.prev_page()
    }

    /// Whether a viewport change invalidates what is displayed.
    ///
    /// Styled output depends on the height only; plain text on both axes.
    #[must_use]
    pub fn wants_resize_rerender(&self, old: Viewport, new: Viewport) -> bool {
        let Some(result) = &self.current else {
            return false;
        };

        match result.content {
            PreviewContent::Styled(_) => old.height != new.height,
            PreviewContent::Text { .. } => old != new,
            _ => false,
        }
    }

    /// Forward a resize to `pipeline` and re-dispatch when the text bounds changed.
    pub fn resize(&self, pipeline: &PreviewPipeline, viewport: Viewport) -> bool {
        let old = pipeline.set_viewport(viewport);

        !pipeline.preview_full() && self.wants_resize_rerender(old, viewport) && pipeline.refresh()
    }
}
