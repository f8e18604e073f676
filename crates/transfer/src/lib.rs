//! Blob-transfer boundary for the upload engine.
//!
//! Everything the orchestrator needs from the storage side lives here:
//! the [`BlobTransfer`] seam and its outcome types, resumable
//! [`Checkpoint`]s and the [`CheckpointStore`] that keeps them across
//! restarts, the chunk-size policy, file fingerprints, and the accepted
//! file-type policy. [`LocalBlobStore`] is a directory-backed transfer
//! client used for local targets and tests.

mod accept;
mod checkpoint;
mod chunked;
mod client;
mod fingerprint;
mod local;
mod part_size;
mod store;
mod validation;

pub use accept::{AcceptPolicy, DEFAULT_ACCEPTED_TYPES};
pub use checkpoint::{Checkpoint, CompletedPart};
pub use chunked::{ChunkReader, ChunkWriter, Part, checksum_bytes};
pub use client::{
    BlobTransfer, ProgressCallback, SourceFile, StorageCredentials, TransferFailure,
    TransferFuture, TransferRequest,
};
pub use fingerprint::fingerprint;
pub use local::LocalBlobStore;
pub use part_size::part_size;
pub use store::{CheckpointStore, JsonFileStore, MemoryStore};
pub use validation::validate_object_name;

/// 1 MiB.
pub const MIB: u64 = 1024 * 1024;

/// 1 GiB.
pub const GIB: u64 = 1024 * MIB;

/// Part size used for files up to 2 GiB and as the fallback beyond 30 GiB.
pub const DEFAULT_PART_SIZE: u64 = 2 * MIB;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid object name: {0}")]
    InvalidPath(String),
}
