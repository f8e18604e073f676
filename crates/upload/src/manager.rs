//! Per-file upload state machine.
//!
//! An [`UploadManager`] drives one file through initiate, transfer,
//! recovery and settlement. Expected failures are returned as an
//! [`UploadOutcome`]; the only error that propagates is a transport
//! failure while renewing storage credentials.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vidup_protocol::{InitUploadRequest, UploadCallback, UserCredentials};
use vidup_transfer::{
    BlobTransfer, Checkpoint, CheckpointStore, ProgressCallback, SourceFile, StorageCredentials,
    TransferFailure, TransferRequest, fingerprint, part_size,
};

use crate::config::OrchestratorConfig;
use crate::control::ControlPlane;
use crate::error::{Failure, FailureKind, UploadError};
use crate::metadata::{MetadataUpdate, VideoMetadata};
use crate::queue::Identified;
use crate::types::{FileEventHandlers, UploadEvent, UploadOutcome, UploadSnapshot, UploadStatus};

const NETWORK_MESSAGE: &str = "network error, check the connection and retry";

/// Collaborators and settings shared by every upload of an orchestrator.
#[derive(Clone)]
pub struct UploadContext {
    pub control: Arc<dyn ControlPlane>,
    pub transfer: Arc<dyn BlobTransfer>,
    pub store: Arc<dyn CheckpointStore>,
    pub config: OrchestratorConfig,
    user: Arc<RwLock<UserCredentials>>,
}

impl UploadContext {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        transfer: Arc<dyn BlobTransfer>,
        store: Arc<dyn CheckpointStore>,
        user: UserCredentials,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            control,
            transfer,
            store,
            config,
            user: Arc::new(RwLock::new(user)),
        }
    }

    /// Current signed user credentials.
    pub fn user(&self) -> UserCredentials {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the user credentials for every upload sharing this context.
    pub fn set_user(&self, user: UserCredentials) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

/// Storage coordinates of a registered video.
#[derive(Debug, Clone)]
struct Session {
    video_id: String,
    object_name: String,
    credentials: StorageCredentials,
    callback: Option<UploadCallback>,
}

#[derive(Debug)]
struct State {
    status: UploadStatus,
    /// Status to restore when a start is rejected before transferring.
    resume_status: UploadStatus,
    progress: f64,
    metadata: VideoMetadata,
    retry_budget: u32,
    removed: bool,
    session: Option<Session>,
    cancel: Option<CancellationToken>,
    last_failure: Option<Failure>,
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one file's upload.
pub struct UploadManager {
    id: String,
    file: SourceFile,
    ctx: UploadContext,
    handlers: FileEventHandlers,
    state: Arc<Mutex<State>>,
    /// Serializes runs so two transfers for one file never overlap.
    run_lock: tokio::sync::Mutex<()>,
}

impl Identified for UploadManager {
    fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl UploadManager {
    /// Creates a manager in [`UploadStatus::NotStarted`].
    ///
    /// Metadata starts from the file defaults with `metadata` merged on
    /// top. The id is the fingerprint of the current user, the category and
    /// the file, and never changes afterwards.
    pub fn new(
        ctx: UploadContext,
        file: SourceFile,
        metadata: MetadataUpdate,
        handlers: FileEventHandlers,
    ) -> Self {
        let mut meta = VideoMetadata::for_file(&file.name);
        meta.apply(metadata);

        let user = ctx.user();
        let id = fingerprint(
            &user.user_id,
            meta.category_id,
            &file.name,
            &file.mime_type,
            file.size,
        );
        let retry_budget = ctx.config.retry_count;

        Self {
            id,
            file,
            ctx,
            handlers,
            state: Arc::new(Mutex::new(State {
                status: UploadStatus::NotStarted,
                resume_status: UploadStatus::NotStarted,
                progress: 0.0,
                metadata: meta,
                retry_budget,
                removed: false,
                session: None,
                cancel: None,
                last_failure: None,
            })),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status
    }

    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    pub fn metadata(&self) -> VideoMetadata {
        self.lock().metadata.clone()
    }

    /// Transfer retries left.
    pub fn retry_budget(&self) -> u32 {
        self.lock().retry_budget
    }

    /// Video id assigned by the control plane, once initiated.
    pub fn remote_video_id(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.video_id.clone())
    }

    pub fn last_failure(&self) -> Option<Failure> {
        self.lock().last_failure.clone()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let st = self.lock();
        UploadSnapshot {
            id: self.id.clone(),
            file_name: self.file.name.clone(),
            mime_type: self.file.mime_type.clone(),
            size: self.file.size,
            status: st.status,
            progress: st.progress,
            metadata: st.metadata.clone(),
            remote_video_id: st.session.as_ref().map(|s| s.video_id.clone()),
            retry_budget: st.retry_budget,
            last_failure: st.last_failure.clone(),
        }
    }

    /// Merges a metadata change. Allowed in any state.
    pub fn update_metadata(&self, update: MetadataUpdate) {
        self.lock().metadata.apply(update);
    }

    /// Starts or resumes the upload and waits until it settles.
    pub async fn start(&self) -> Result<UploadOutcome, UploadError> {
        if !self.begin() {
            return Ok(UploadOutcome::Skipped(self.status()));
        }
        self.run().await
    }

    /// Moves a `NotStarted` or `Paused` upload to `Uploading`.
    ///
    /// Returns `false` if the upload is not startable. A start after a
    /// permanent failure refills the retry budget.
    pub fn begin(&self) -> bool {
        let mut st = self.lock();
        if st.removed || !matches!(st.status, UploadStatus::NotStarted | UploadStatus::Paused) {
            return false;
        }
        st.resume_status = st.status;
        st.status = UploadStatus::Uploading;
        if st.last_failure.take().is_some() {
            st.retry_budget = self.ctx.config.retry_count;
        }
        true
    }

    /// Requests a pause. Only valid while uploading.
    ///
    /// The in-flight transfer, if any, is cancelled and the pending run
    /// settles as [`UploadOutcome::Paused`].
    pub fn stop(&self) -> bool {
        let token = {
            let mut st = self.lock();
            if st.status != UploadStatus::Uploading {
                return false;
            }
            st.status = UploadStatus::Paused;
            st.cancel.take()
        };
        match token {
            Some(token) => {
                debug!(id = %self.id, "cancelling transfer");
                token.cancel();
            }
            None => debug!(id = %self.id, "paused with no transfer in flight"),
        }
        true
    }

    /// Flags the upload as removed and cancels it if uploading.
    ///
    /// A removed upload emits no `FileStopped`, never saves another
    /// checkpoint and cannot be started again.
    pub(crate) fn detach(&self) -> bool {
        self.lock().removed = true;
        self.stop()
    }

    /// Runs an upload already moved to `Uploading` by [`begin`](Self::begin).
    pub async fn run(&self) -> Result<UploadOutcome, UploadError> {
        let _guard = self.run_lock.lock().await;

        match self.status() {
            UploadStatus::Uploading => {}
            UploadStatus::Completed => return Ok(UploadOutcome::Completed),
            // Stopped before this run got going.
            _ => return Ok(UploadOutcome::Paused),
        }

        let known = self.lock().session.clone();
        let session = match known {
            Some(session) => {
                debug!(id = %self.id, video = %session.video_id, "resuming without initiate");
                session
            }
            None => match self.initiate().await {
                ControlFlow::Continue(session) => session,
                ControlFlow::Break(outcome) => return Ok(outcome),
            },
        };

        self.transfer(session).await
    }

    // -----------------------------------------------------------------------
    // Initiate
    // -----------------------------------------------------------------------

    async fn initiate(&self) -> ControlFlow<UploadOutcome, Session> {
        let user = self.ctx.user();
        let mut request = InitUploadRequest::signed(&user, self.file.size);
        self.lock().metadata.fill_request(&mut request);

        debug!(id = %self.id, file = %self.file.name, size = self.file.size, "initiating upload");
        let response = match self.ctx.control.initiate(user, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %self.id, error = %e, "initiate failed");
                return ControlFlow::Break(
                    self.fail(FailureKind::NetworkError, format!("{NETWORK_MESSAGE}: {e}")),
                );
            }
        };

        if !response.code_ok() {
            warn!(id = %self.id, code = response.code, message = %response.message, "initiate rejected");
            return ControlFlow::Break(self.fail(
                FailureKind::NetworkError,
                format!("{NETWORK_MESSAGE}: {} ({})", response.message, response.code),
            ));
        }
        let Some(data) = response.data else {
            return ControlFlow::Break(self.fail(
                FailureKind::NetworkError,
                format!("{NETWORK_MESSAGE}: initiate response carried no data"),
            ));
        };

        let remaining = u64::try_from(data.remain_space).unwrap_or(0);
        if self.file.size > remaining {
            info!(id = %self.id, size = self.file.size, remaining, "insufficient space");
            return ControlFlow::Break(self.reject(Failure::new(
                FailureKind::QuotaExceeded,
                "insufficient remaining space for this file",
            )));
        }

        let callback = data.callback.as_deref().and_then(|raw| {
            UploadCallback::parse(raw)
                .inspect_err(|e| warn!(id = %self.id, error = %e, "ignoring malformed callback"))
                .ok()
                .flatten()
        });
        let session = Session {
            object_name: format!("{}{}{}", data.dir, data.vid, self.file.extension()),
            credentials: StorageCredentials::from_grant(
                &data.grant,
                self.ctx.config.secure_transport,
            ),
            video_id: data.vid,
            callback,
        };

        let (removed, metadata) = {
            let mut st = self.lock();
            st.session = Some(session.clone());
            (st.removed, st.metadata.clone())
        };
        if removed {
            return ControlFlow::Break(UploadOutcome::Paused);
        }

        info!(id = %self.id, video = %session.video_id, object = %session.object_name, "upload started");
        self.handlers.emit(&UploadEvent::Started {
            id: self.id.clone(),
            metadata,
        });
        ControlFlow::Continue(session)
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    async fn transfer(&self, mut session: Session) -> Result<UploadOutcome, UploadError> {
        let part_size = self
            .ctx
            .config
            .part_size
            .unwrap_or_else(|| part_size(self.file.size));
        let mut token: Option<CancellationToken> = None;
        let mut attempt = 0u32;

        loop {
            let current = {
                let mut st = self.lock();
                let cancelled = token.as_ref().is_some_and(CancellationToken::is_cancelled);
                if cancelled || st.status != UploadStatus::Uploading {
                    drop(st);
                    return Ok(self.cancelled());
                }
                let fresh = CancellationToken::new();
                st.cancel = Some(fresh.clone());
                fresh
            };
            token = Some(current.clone());

            let checkpoint = self.ctx.store.load(&self.id);
            if let Some(cp) = &checkpoint {
                debug!(id = %self.id, done = cp.done_parts.len(), "resuming from checkpoint");
            }
            let request = TransferRequest {
                object_name: session.object_name.clone(),
                file: self.file.clone(),
                parallel: self.ctx.config.parallel_parts,
                part_size,
                checkpoint,
                callback: session.callback.clone(),
                progress: Some(self.progress_callback()),
            };

            let result = self
                .ctx
                .transfer
                .upload(session.credentials.clone(), request, current.clone())
                .await;

            let failure = match result {
                Ok(()) => return Ok(self.finish()),
                Err(_) if current.is_cancelled() => return Ok(self.cancelled()),
                Err(failure) => failure,
            };

            match failure {
                TransferFailure::SessionNotFound(message) => {
                    if !self.take_retry() {
                        return Ok(self.fail(FailureKind::SessionExpired, message));
                    }
                    warn!(id = %self.id, error = %message, "transfer session lost, restarting from scratch");
                    self.ctx.store.delete(&self.id);
                }
                TransferFailure::Unauthorized(message) => {
                    if !self.take_retry() {
                        return Ok(self.fail(FailureKind::CredentialsExpired, message));
                    }
                    info!(id = %self.id, "storage credentials expired, renewing");
                    match self.refresh_credentials().await? {
                        ControlFlow::Continue(credentials) => {
                            session.credentials = credentials.clone();
                            if let Some(s) = self.lock().session.as_mut() {
                                s.credentials = credentials;
                            }
                        }
                        ControlFlow::Break(outcome) => return Ok(outcome),
                    }
                    continue;
                }
                TransferFailure::Other(message) => {
                    if !self.take_retry() {
                        return Ok(self.fail(FailureKind::TransientTransferError, message));
                    }
                    warn!(id = %self.id, error = %message, "transfer failed, retrying");
                }
                TransferFailure::Cancelled => return Ok(self.cancelled()),
            }

            attempt += 1;
            let delay = self.ctx.config.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(id = %self.id, attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
                tokio::select! {
                    _ = current.cancelled() => return Ok(self.cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    async fn refresh_credentials(
        &self,
    ) -> Result<ControlFlow<UploadOutcome, StorageCredentials>, UploadError> {
        let response = match self.ctx.control.refresh_credentials(self.ctx.user()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %self.id, error = %e, "credential refresh failed");
                self.fail(FailureKind::NetworkError, format!("{NETWORK_MESSAGE}: {e}"));
                return Err(UploadError::CredentialRefresh {
                    id: self.id.clone(),
                    source: e,
                });
            }
        };

        if !response.status_ok() {
            warn!(id = %self.id, status = %response.status, message = %response.message, "credential refresh rejected");
            return Ok(ControlFlow::Break(self.fail(
                FailureKind::NetworkError,
                format!("{NETWORK_MESSAGE}: {}", response.message),
            )));
        }
        match response.data {
            Some(grant) => Ok(ControlFlow::Continue(StorageCredentials::from_grant(
                &grant,
                self.ctx.config.secure_transport,
            ))),
            None => Ok(ControlFlow::Break(self.fail(
                FailureKind::NetworkError,
                format!("{NETWORK_MESSAGE}: credential response carried no data"),
            ))),
        }
    }

    fn progress_callback(&self) -> ProgressCallback {
        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.ctx.store);
        let handlers = self.handlers.clone();
        let id = self.id.clone();

        Arc::new(move |fraction: f64, checkpoint: Checkpoint| {
            let progress = {
                let mut st = lock_state(&state);
                if st.removed {
                    return;
                }
                st.progress = st.progress.max(fraction.clamp(0.0, 1.0));
                // Saved under the lock so a concurrent removal cannot be
                // followed by a stale save.
                store.save(&id, &checkpoint);
                st.progress
            };
            handlers.emit(&UploadEvent::Progress {
                id: id.clone(),
                progress,
            });
        })
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    fn take_retry(&self) -> bool {
        let mut st = self.lock();
        if st.retry_budget == 0 {
            return false;
        }
        st.retry_budget -= 1;
        debug!(id = %self.id, remaining = st.retry_budget, "retry budget consumed");
        true
    }

    fn finish(&self) -> UploadOutcome {
        let metadata = {
            let mut st = self.lock();
            st.status = UploadStatus::Completed;
            st.progress = 1.0;
            st.cancel = None;
            st.last_failure = None;
            st.metadata.clone()
        };
        self.ctx.store.delete(&self.id);
        info!(id = %self.id, file = %self.file.name, "upload completed");
        self.handlers.emit(&UploadEvent::Succeeded {
            id: self.id.clone(),
            metadata,
        });
        UploadOutcome::Completed
    }

    fn cancelled(&self) -> UploadOutcome {
        let (removed, metadata) = {
            let mut st = self.lock();
            st.cancel = None;
            (st.removed, st.metadata.clone())
        };
        if removed {
            self.ctx.store.delete(&self.id);
            debug!(id = %self.id, "removed upload settled");
        } else {
            info!(id = %self.id, "upload paused");
            self.handlers.emit(&UploadEvent::Stopped {
                id: self.id.clone(),
                metadata,
            });
        }
        UploadOutcome::Paused
    }

    /// Settles as permanently failed and emits `FileFailed`.
    fn fail(&self, kind: FailureKind, message: impl Into<String>) -> UploadOutcome {
        let failure = Failure::new(kind, message);
        let metadata = {
            let mut st = self.lock();
            st.status = if st.session.is_some() {
                UploadStatus::Paused
            } else {
                UploadStatus::NotStarted
            };
            st.cancel = None;
            st.last_failure = Some(failure.clone());
            st.metadata.clone()
        };
        warn!(id = %self.id, code = failure.code(), error = %failure.message, "upload failed");
        self.handlers.emit(&UploadEvent::Failed {
            id: self.id.clone(),
            failure: failure.clone(),
            metadata,
        });
        UploadOutcome::Failed(failure)
    }

    /// Settles as rejected without emitting anything.
    fn reject(&self, failure: Failure) -> UploadOutcome {
        let mut st = self.lock();
        st.status = st.resume_status;
        st.cancel = None;
        st.last_failure = Some(failure.clone());
        UploadOutcome::Rejected(failure)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }
}
