//! Messages from preview workers to the UI-owning loop.

use std::{path::PathBuf, time::Instant};

use compact_str::CompactString;

use super::model::PreviewResult;

/// Notification levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotificationLevel {
    Info = 0,
    Success = 1,
    Warning = 2,
    Error = 3,
}

/// Non-blocking toast raised by the pipeline
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: CompactString,
    pub message: CompactString,
    pub level: NotificationLevel,
    pub timestamp: Instant,
}

impl Notification {
    #[inline]
    #[must_use]
    pub fn new(
        level: NotificationLevel,
        title: impl Into<CompactString>,
        message: impl Into<CompactString>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            timestamp: Instant::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn warning(title: impl Into<CompactString>, message: impl Into<CompactString>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    #[inline]
    #[must_use]
    pub fn error(title: impl Into<CompactString>, message: impl Into<CompactString>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

/// Every variant is tagged with the generation it belongs to; the surface
/// drops anything older than its current one.
#[derive(Debug, Clone)]
pub enum PreviewEvent {
    Loading {
        generation: u64,
        loading: bool,
    },

    Notify {
        generation: u64,
        notification: Notification,
    },

    Resolved {
        generation: u64,
        result: Box<PreviewResult>,
    },

    /// Unexpected failure caught at the worker boundary.
    Failed {
        generation: u64,
        path: PathBuf,
        message: CompactString,
    },
}

impl PreviewEvent {
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Loading { generation, .. }
            | Self::Notify { generation, .. }
            | Self::Resolved { generation, .. }
            | Self::Failed { generation, .. } => *generation,
        }
    }
}
