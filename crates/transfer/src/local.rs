//! Directory-backed [`BlobTransfer`] implementation.
//!
//! Layout under the root:
//! - `.uploads/<session>`: staging file of an in-progress session
//! - `<bucket>/<object>`: completed objects

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, CompletedPart};
use crate::chunked::{ChunkReader, ChunkWriter};
use crate::client::{BlobTransfer, StorageCredentials, TransferFailure, TransferFuture, TransferRequest};
use crate::validation::validate_object_name;
use crate::{DEFAULT_PART_SIZE, TransferError};

const STAGING_DIR: &str = ".uploads";

/// Stores uploaded objects on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    throttle: Duration,
}

impl LocalBlobStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            throttle: Duration::ZERO,
        }
    }

    /// Waits `delay` after each part, emulating a slow link.
    pub fn with_throttle(mut self, delay: Duration) -> Self {
        self.throttle = delay;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a completed object.
    pub fn object_path(&self, bucket: &str, object_name: &str) -> PathBuf {
        self.root.join(bucket).join(object_name)
    }

    fn staging_path(&self, session_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(session_id)
    }

    /// Picks the checkpoint to continue from, or starts a new session.
    fn resolve_session(
        &self,
        request: &TransferRequest,
        part_size: u64,
    ) -> Result<Checkpoint, TransferFailure> {
        let file_size = request.file.size;
        match &request.checkpoint {
            Some(cp) if cp.matches(&request.object_name, file_size, part_size) => {
                if validate_object_name(&cp.session_id).is_err()
                    || !self.staging_path(&cp.session_id).is_file()
                {
                    return Err(TransferFailure::SessionNotFound(cp.session_id.clone()));
                }
                debug!(
                    session = %cp.session_id,
                    done = cp.done_parts.len(),
                    "resuming transfer session"
                );
                Ok(cp.clone())
            }
            other => {
                if let Some(stale) = other {
                    debug!(session = %stale.session_id, "checkpoint does not match request, starting over");
                }
                Ok(Checkpoint::new(
                    uuid::Uuid::new_v4().to_string(),
                    request.object_name.clone(),
                    file_size,
                    part_size,
                ))
            }
        }
    }

    async fn transfer(
        &self,
        credentials: StorageCredentials,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> Result<(), TransferFailure> {
        if credentials.access_key_id.is_empty() {
            return Err(TransferFailure::Unauthorized("missing access key".into()));
        }
        validate_object_name(&credentials.bucket)?;
        validate_object_name(&request.object_name)?;

        let part_size = if request.part_size == 0 {
            DEFAULT_PART_SIZE
        } else {
            request.part_size
        };
        let mut checkpoint = self.resolve_session(&request, part_size)?;
        let staging = self.staging_path(&checkpoint.session_id);

        let mut reader = ChunkReader::new(&request.file.path, part_size)?;
        if reader.file_size() != request.file.size {
            return Err(TransferFailure::Other(format!(
                "source size changed: expected {}, found {}",
                request.file.size,
                reader.file_size()
            )));
        }
        let mut writer = ChunkWriter::open(&staging)?;

        for number in 1..=checkpoint.part_count() {
            if cancel.is_cancelled() {
                return Err(TransferFailure::Cancelled);
            }
            if checkpoint.done_parts.iter().any(|p| p.number == number) {
                continue;
            }

            // The progress callback may persist the checkpoint, so it runs
            // on the blocking pool with the part copy.
            let progress = request.progress.clone();
            let (r, w, cp, copied) = tokio::task::spawn_blocking(move || {
                let copied = copy_part(&mut reader, &mut writer, number).map(|etag| {
                    checkpoint.done_parts.push(CompletedPart { number, etag });
                    if let Some(progress) = &progress {
                        progress(checkpoint.progress(), checkpoint.clone());
                    }
                });
                (reader, writer, checkpoint, copied)
            })
            .await
            .map_err(|e| TransferFailure::Other(format!("part task failed: {e}")))?;
            reader = r;
            writer = w;
            checkpoint = cp;
            copied?;

            if !self.throttle.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransferFailure::Cancelled),
                    _ = tokio::time::sleep(self.throttle) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }

        if cancel.is_cancelled() {
            return Err(TransferFailure::Cancelled);
        }

        let target = self.object_path(&credentials.bucket, &request.object_name);
        tokio::task::spawn_blocking(move || finish(writer, &target))
            .await
            .map_err(|e| TransferFailure::Other(format!("finish task failed: {e}")))??;

        if let Some(callback) = &request.callback {
            debug!(url = %callback.url, "storage callback registered");
        }
        info!(
            object = %request.object_name,
            bytes = request.file.size,
            parts = checkpoint.part_count(),
            "object stored"
        );
        Ok(())
    }
}

fn copy_part(
    reader: &mut ChunkReader,
    writer: &mut ChunkWriter,
    number: u32,
) -> Result<String, TransferError> {
    let part = reader.read_part(number)?.ok_or_else(|| {
        TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("part {number} past end of file"),
        ))
    })?;
    writer.write_part(&part)?;
    Ok(part.checksum)
}

fn finish(mut writer: ChunkWriter, target: &Path) -> Result<(), TransferError> {
    writer.sync()?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(writer.path(), target)?;
    Ok(())
}

impl BlobTransfer for LocalBlobStore {
    fn upload(
        &self,
        credentials: StorageCredentials,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> TransferFuture<'_> {
        Box::pin(self.transfer(credentials, request, cancel))
    }
}
