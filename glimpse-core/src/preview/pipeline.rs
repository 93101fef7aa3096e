//! `src/preview/pipeline.rs`
//! ============================================================================
//! # Preview dispatch and the background worker
//!
//! - `show_preview` advances the generation and overwrites the single
//!   request slot; it never blocks and never queues more than one request.
//! - At most one worker task runs per pipeline. It drains the slot until it
//!   is empty, so a superseded request hands off to the newest one as soon
//!   as it reaches a checkpoint.
//! - Results travel to the UI-owning loop as [`PreviewEvent`]s; the worker
//!   never touches surface state.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use compact_str::CompactString;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, error, info, instrument};

use super::{
    events::PreviewEvent,
    model::{PreviewRequest, RenderBounds, Viewport},
    resolver::{PreviewServices, Resolver},
    ticket::{GenerationCounter, Ticket},
};
use crate::{
    config::PreviewConfig,
    error::{CoreError, CoreResult},
    util::slot::LatestSlot,
};

/// State shared with the worker task.
#[derive(Debug)]
struct Shared {
    counter: GenerationCounter,
    slot: LatestSlot<PreviewRequest>,
    worker_busy: AtomicBool,
    resolver: Resolver,
    events: UnboundedSender<PreviewEvent>,
}

/// Dispatcher-side view of the surface.
#[derive(Debug)]
struct ViewState {
    visible: bool,
    /// Newest path requested while hidden
    pending: Option<PathBuf>,
    viewport: Viewport,
    last_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct PreviewPipeline {
    shared: Arc<Shared>,
    view: Mutex<ViewState>,
    handle: Handle,
}

impl PreviewPipeline {
    /// Build a pipeline on the current tokio runtime.
    ///
    /// The returned receiver belongs to the UI-owning loop.
    pub fn new(
        config: Arc<PreviewConfig>,
        services: PreviewServices,
        viewport: Viewport,
    ) -> CoreResult<(Self, UnboundedReceiver<PreviewEvent>)> {
        let handle = Handle::try_current()
            .map_err(|e| CoreError::other(format!("preview pipeline needs a tokio runtime: {e}")))?;
        let (events, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            counter: GenerationCounter::new(),
            slot: LatestSlot::new(),
            worker_busy: AtomicBool::new(false),
            resolver: Resolver::new(config, services),
            events,
        });

        let pipeline = Self {
            shared,
            view: Mutex::new(ViewState {
                visible: true,
                pending: None,
                viewport,
                last_path: None,
            }),
            handle,
        };

        Ok((pipeline, receiver))
    }

    /// Same as [`new`](Self::new) with collaborators taken from `config`.
    pub fn from_config(
        config: Arc<PreviewConfig>,
        viewport: Viewport,
    ) -> CoreResult<(Self, UnboundedReceiver<PreviewEvent>)> {
        let services = PreviewServices::from_config(&config);
        Self::new(config, services, viewport)
    }

    /// Counter the surface compares event generations against.
    #[must_use]
    pub fn generation_counter(&self) -> GenerationCounter {
        self.shared.counter.clone()
    }

    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.shared.resolver
    }

    #[must_use]
    pub fn preview_full(&self) -> bool {
        self.shared.resolver.config().preview_full
    }

    /// Fire-and-forget. While hidden only the newest path is remembered.
    pub fn show_preview(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut view = self.view.lock();

        if !view.visible {
            debug!(path = %path.display(), "surface hidden, coalescing request");
            view.pending = Some(path);
            return;
        }

        view.pending = None;
        view.last_path = Some(path.clone());
        let bounds = self.bounds(view.viewport);
        drop(view);

        self.dispatch(path, bounds);
    }

    /// Showing the surface dispatches the coalesced request, if any.
    pub fn set_visible(&self, visible: bool) {
        let mut view = self.view.lock();
        view.visible = visible;

        if !visible {
            return;
        }

        if let Some(path) = view.pending.take() {
            view.last_path = Some(path.clone());
            let bounds = self.bounds(view.viewport);
            drop(view);

            self.dispatch(path, bounds);
        }
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.view.lock().visible
    }

    /// Store the new viewport and return the previous one.
    pub fn set_viewport(&self, viewport: Viewport) -> Viewport {
        std::mem::replace(&mut self.view.lock().viewport, viewport)
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.view.lock().viewport
    }

    /// Re-dispatch the last shown path with the current bounds.
    ///
    /// Returns `false` when hidden or when nothing was shown yet.
    pub fn refresh(&self) -> bool {
        let view = self.view.lock();
        if !view.visible {
            return false;
        }

        let Some(path) = view.last_path.clone() else {
            return false;
        };
        let bounds = self.bounds(view.viewport);
        drop(view);

        self.dispatch(path, bounds);
        true
    }

    fn bounds(&self, viewport: Viewport) -> RenderBounds {
        RenderBounds::for_viewport(viewport, self.preview_full())
    }

    fn dispatch(&self, path: PathBuf, bounds: RenderBounds) {
        let generation = self.shared.counter.advance();

        let displaced = self.shared.slot.put(PreviewRequest {
            path,
            generation,
            bounds,
        });
        debug!(generation, displaced, "preview request queued");

        if self
            .shared
            .worker_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.handle.spawn(Arc::clone(&self.shared).run_worker());
        }
    }
}

impl Shared {
    async fn run_worker(self: Arc<Self>) {
        loop {
            while let Some(request) = self.slot.take() {
                self.process(&request).await;
            }

            self.worker_busy.store(false, Ordering::Release);

            // A dispatch may have filled the slot after the last take but
            // before the flag was released; it saw a busy worker and left.
            if self.slot.is_empty()
                || self
                    .worker_busy
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                break;
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(generation = request.generation, path = %request.path.display()))]
    async fn process(&self, request: &PreviewRequest) {
        let ticket = self.counter.ticket(request.generation);
        if !ticket.is_current() {
            debug!("superseded before start");
            return;
        }

        self.send(
            &ticket,
            PreviewEvent::Loading {
                generation: request.generation,
                loading: true,
            },
        );

        let outcome = AssertUnwindSafe(self.resolver.resolve(request, &ticket, &self.events))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    marker = "PREVIEW_RESOLVED",
                    operation_type = "preview_resolve",
                    preview_type = ?result.preview_type,
                    mime = result.mime_type.as_deref().unwrap_or("-"),
                    "preview resolved"
                );

                self.send(
                    &ticket,
                    PreviewEvent::Resolved {
                        generation: request.generation,
                        result: Box::new(result),
                    },
                );
                self.send(
                    &ticket,
                    PreviewEvent::Loading {
                        generation: request.generation,
                        loading: false,
                    },
                );
            }

            Ok(Err(e)) if e.is_superseded() => {
                debug!("superseded, handing off");
            }

            Ok(Err(e)) => {
                let e = e.trace();
                self.fail(&ticket, request, e.to_string().into());
            }

            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    marker = "PREVIEW_WORKER_PANIC",
                    operation_type = "worker_boundary",
                    panic = %message,
                    "preview worker panicked"
                );
                self.fail(&ticket, request, message);
            }
        }
    }

    fn fail(&self, ticket: &Ticket, request: &PreviewRequest, message: CompactString) {
        self.send(
            ticket,
            PreviewEvent::Failed {
                generation: request.generation,
                path: request.path.clone(),
                message,
            },
        );
    }

    /// Send only while `ticket` is current.
    fn send(&self, ticket: &Ticket, event: PreviewEvent) {
        if !ticket.is_current() {
            return;
        }

        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> CompactString {
    if let Some(message) = panic.downcast_ref::<&str>() {
        CompactString::new(message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        CompactString::new(message)
    } else {
        CompactString::const_new("unknown panic")
    }
}
