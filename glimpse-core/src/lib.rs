pub mod error;

pub mod config;

pub mod scorer;
pub use scorer::{Ranked, rank, score};

pub mod cache {
    pub mod page_cache;
}

pub mod preview {
    pub mod archive;

    pub mod events;
    pub use events::{Notification, NotificationLevel, PreviewEvent};

    pub mod image_probe;

    pub mod mime;

    pub mod model;
    pub use model::{
        PreviewContent, PreviewKind, PreviewRequest, PreviewResult, PreviewType, RenderBounds,
        Viewport,
    };

    pub mod pdf;

    pub mod pipeline;
    pub use pipeline::PreviewPipeline;

    pub mod resolver;
    pub use resolver::PreviewServices;

    pub mod rules;

    pub mod surface;
    pub use surface::{PreviewSurface, SurfacePhase, SurfaceUpdate};

    pub mod text;

    pub mod ticket;
}

pub mod logging;
pub use logging::Logger;

pub mod util {
    pub mod process;

    pub mod slot;
}

pub use error::{CoreError, CoreResult};
