//! Upload orchestration for the video platform.
//!
//! This crate owns the **business logic** of getting local media files
//! onto the platform. It has no transport dependencies of its own: the
//! embedder supplies a [`ControlPlane`] (video registration and credential
//! renewal), a [`BlobTransfer`](vidup_transfer::BlobTransfer) backend and a
//! [`CheckpointStore`](vidup_transfer::CheckpointStore).
//!
//! # Lifecycle of one file
//!
//! 1. **Add**: fingerprint, accepted-type and duplicate checks
//! 2. **Admit**: the scheduler starts it once a slot is free
//! 3. **Initiate**: register the video, receive storage credentials
//! 4. **Transfer**: chunked upload, resumable from a saved checkpoint
//! 5. **Recover**: retry, restart a lost session, or renew credentials
//! 6. **Settle**: completed, paused, or failed

pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod orchestrator;
pub mod queue;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{OrchestratorConfig, RetryConfig};
pub use control::{ControlFuture, ControlPlane};
pub use error::{ConfigError, ControlPlaneError, Failure, FailureKind, UploadError};
pub use manager::{UploadContext, UploadManager};
pub use metadata::{MetadataUpdate, VideoMetadata, sanitize};
pub use orchestrator::UploadOrchestrator;
pub use queue::{Identified, UploadQueue};
pub use types::{
    EventHandler, EventKind, FileEventHandlers, OrchestratorEvent, UploadEvent, UploadOutcome,
    UploadSnapshot, UploadStatus,
};
