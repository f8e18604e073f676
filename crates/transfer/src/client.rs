//! The seam between the upload engine and an object-storage backend.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vidup_protocol::{StorageGrant, UploadCallback};

use crate::TransferError;
use crate::checkpoint::Checkpoint;

/// Temporary credentials and coordinates for one storage bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    /// Storage host, without scheme.
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    /// Use HTTPS when talking to the endpoint.
    pub secure: bool,
}

impl StorageCredentials {
    /// Builds credentials from a control-plane grant.
    pub fn from_grant(grant: &StorageGrant, secure: bool) -> Self {
        Self {
            endpoint: grant.domain.clone(),
            bucket: grant.bucket_name.clone(),
            access_key_id: grant.access_id.clone(),
            access_key_secret: grant.access_key.clone(),
            security_token: grant.token.clone(),
            secure,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Handle to the source bytes of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Display name, normally the final path component.
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl SourceFile {
    /// Describes the file at `path`, reading its size from the filesystem.
    pub fn new(path: impl AsRef<Path>, mime_type: impl Into<String>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime_type: mime_type.into(),
            size: metadata.len(),
        })
    }

    /// Describes a file without touching the filesystem.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Final `.ext` of the file name, dot included, or `""`.
    pub fn extension(&self) -> &str {
        self.name.rfind('.').map_or("", |idx| &self.name[idx..])
    }
}

/// Invoked after every confirmed part with the overall fraction and the
/// checkpoint that resumes from that point. Backends call it from a
/// blocking context, so it may do synchronous I/O.
pub type ProgressCallback = Arc<dyn Fn(f64, Checkpoint) + Send + Sync>;

/// Everything a backend needs for one transfer attempt.
#[derive(Clone)]
pub struct TransferRequest {
    /// Object key inside the bucket.
    pub object_name: String,
    pub file: SourceFile,
    /// Concurrency hint for part uploads.
    pub parallel: Option<usize>,
    /// Part size in bytes.
    pub part_size: u64,
    /// Resume point from an earlier attempt.
    pub checkpoint: Option<Checkpoint>,
    /// Completion callback the backend should register.
    pub callback: Option<UploadCallback>,
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("object_name", &self.object_name)
            .field("file", &self.file)
            .field("parallel", &self.parallel)
            .field("part_size", &self.part_size)
            .field("checkpoint", &self.checkpoint)
            .field("callback", &self.callback)
            .finish_non_exhaustive()
    }
}

/// Classified outcome of a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferFailure {
    /// The cancellation token fired.
    #[error("transfer cancelled")]
    Cancelled,

    /// The backend no longer knows the multipart session.
    #[error("transfer session not found: {0}")]
    SessionNotFound(String),

    /// The credentials were rejected or have expired.
    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

impl From<TransferError> for TransferFailure {
    fn from(e: TransferError) -> Self {
        Self::Other(e.to_string())
    }
}

/// Future returned by [`BlobTransfer::upload`].
pub type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransferFailure>> + Send + 'a>>;

/// A storage backend that performs resumable multipart uploads.
///
/// Implementations must honour `cancel` promptly and report it as
/// [`TransferFailure::Cancelled`], never as success.
pub trait BlobTransfer: Send + Sync {
    fn upload(
        &self,
        credentials: StorageCredentials,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> TransferFuture<'_>;
}
