//! Status, event and snapshot types of the upload flow.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Failure;
use crate::metadata::VideoMetadata;

/// Lifecycle state of a tracked upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum UploadStatus {
    #[default]
    NotStarted,
    Uploading,
    Paused,
    Completed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Event emitted by a single upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UploadEvent {
    /// The video was registered and the transfer is about to begin.
    Started { id: String, metadata: VideoMetadata },
    Progress { id: String, progress: f64 },
    Succeeded { id: String, metadata: VideoMetadata },
    Failed {
        id: String,
        failure: Failure,
        metadata: VideoMetadata,
    },
    /// The transfer was paused by the caller.
    Stopped { id: String, metadata: VideoMetadata },
}

impl UploadEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Started { id, .. }
            | Self::Progress { id, .. }
            | Self::Succeeded { id, .. }
            | Self::Failed { id, .. }
            | Self::Stopped { id, .. } => id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Started { .. } => EventKind::FileStarted,
            Self::Progress { .. } => EventKind::FileProgress,
            Self::Succeeded { .. } => EventKind::FileSucceed,
            Self::Failed { .. } => EventKind::FileFailed,
            Self::Stopped { .. } => EventKind::FileStopped,
        }
    }
}

/// Names under which per-file handlers are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    FileStarted,
    FileProgress,
    FileSucceed,
    FileFailed,
    FileStopped,
}

/// A per-file event callback.
pub type EventHandler = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

/// Named callback registrations injected into an upload.
#[derive(Clone, Default)]
pub struct FileEventHandlers {
    named: Vec<(EventKind, EventHandler)>,
    any: Vec<EventHandler>,
}

impl FileEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.named.push((kind, Arc::new(handler)));
        self
    }

    /// Registers `handler` for every event.
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.any.push(Arc::new(handler));
        self
    }

    /// Delivers `event` to the matching handlers in registration order.
    pub fn emit(&self, event: &UploadEvent) {
        let kind = event.kind();
        for (_, handler) in self.named.iter().filter(|(k, _)| *k == kind) {
            handler(event);
        }
        for handler in &self.any {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.any.is_empty()
    }
}

impl fmt::Debug for FileEventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<EventKind> = self.named.iter().map(|(k, _)| *k).collect();
        f.debug_struct("FileEventHandlers")
            .field("named", &kinds)
            .field("any", &self.any.len())
            .finish()
    }
}

/// Event published on the orchestrator channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OrchestratorEvent {
    /// Forwarded per-file event.
    File(UploadEvent),
    /// Nothing is uploading or waiting for admission.
    AllSettled,
    /// A scheduler-driven run ended with an error that escaped the
    /// handled-outcome channel.
    Fatal { id: String, error: String },
}

/// Point-in-time view of one tracked upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSnapshot {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub status: UploadStatus,
    pub progress: f64,
    pub metadata: VideoMetadata,
    pub remote_video_id: Option<String>,
    pub retry_budget: u32,
    /// Most recent terminal failure, cleared on the next start.
    pub last_failure: Option<Failure>,
}

/// How a start request settled.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Completed,
    /// Stopped by the caller (or removed) while transferring.
    Paused,
    /// Permanently failed; a `FileFailed` event was emitted.
    Failed(Failure),
    /// Rejected before transferring, without any event.
    Rejected(Failure),
    /// Not startable in its current state.
    Skipped(UploadStatus),
}
