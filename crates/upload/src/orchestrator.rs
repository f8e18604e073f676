//! Upload orchestrator: the registry, the admission scheduler and the
//! public facade.
//!
//! Files are admitted in submission order while fewer than
//! `parallel_file_limit` runs hold a slot. A slot is held from admission
//! until the run task settles, so a stop frees it only once the transfer
//! has acknowledged the cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use vidup_protocol::UserCredentials;
use vidup_transfer::{AcceptPolicy, BlobTransfer, CheckpointStore, SourceFile};

use crate::config::OrchestratorConfig;
use crate::control::ControlPlane;
use crate::error::{ConfigError, Failure, FailureKind, UploadError};
use crate::manager::{UploadContext, UploadManager};
use crate::metadata::MetadataUpdate;
use crate::queue::UploadQueue;
use crate::types::{FileEventHandlers, OrchestratorEvent, UploadSnapshot, UploadStatus};

#[derive(Default)]
struct Registry {
    queue: UploadQueue<Arc<UploadManager>>,
    /// Ids awaiting admission.
    waiting: HashSet<String>,
    /// Ids holding a slot, from admission until their run task settles.
    running: HashSet<String>,
    /// `AllSettled` was sent and nothing has been admitted since.
    settled: bool,
}

struct Inner {
    ctx: UploadContext,
    accept: AcceptPolicy,
    registry: Mutex<Registry>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

/// Tracks uploads and runs them with bounded concurrency.
///
/// Methods that may admit uploads (`add_file` with `auto_start`,
/// `start_file`, `start_all`, `remove_file`) spawn Tokio tasks and must be
/// called from within a Tokio runtime.
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
    events_rx: Option<mpsc::UnboundedReceiver<OrchestratorEvent>>,
}

impl UploadOrchestrator {
    /// Creates an orchestrator with the default configuration.
    pub fn new(
        control: Arc<dyn ControlPlane>,
        transfer: Arc<dyn BlobTransfer>,
        store: Arc<dyn CheckpointStore>,
        user: UserCredentials,
    ) -> Self {
        let ctx = UploadContext::new(control, transfer, store, user, OrchestratorConfig::default());
        Self::from_context(ctx)
    }

    /// Creates an orchestrator with a validated configuration.
    pub fn with_config(
        control: Arc<dyn ControlPlane>,
        transfer: Arc<dyn BlobTransfer>,
        store: Arc<dyn CheckpointStore>,
        user: UserCredentials,
        config: OrchestratorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ctx = UploadContext::new(control, transfer, store, user, config);
        Ok(Self::from_context(ctx))
    }

    fn from_context(ctx: UploadContext) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let accept = AcceptPolicy::new(ctx.config.accepted_mime_types.as_deref());
        Self {
            inner: Arc::new(Inner {
                ctx,
                accept,
                registry: Mutex::new(Registry::default()),
                events_tx,
            }),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<OrchestratorEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.ctx.config
    }

    /// Replaces the signed user credentials used by subsequent
    /// control-plane calls.
    pub fn update_user_credentials(&self, user: UserCredentials) {
        debug!(user = %user.user_id, "user credentials updated");
        self.inner.ctx.set_user(user);
    }

    /// Starts tracking `file`.
    ///
    /// Rejected when its type is not accepted or when a file with the same
    /// fingerprint is already tracked. With `auto_start` the file is queued
    /// for admission right away.
    pub fn add_file(
        &self,
        file: SourceFile,
        handlers: FileEventHandlers,
        metadata: MetadataUpdate,
    ) -> Result<UploadSnapshot, Failure> {
        if !self.inner.accept.is_accepted(&file.name, &file.mime_type) {
            info!(file = %file.name, mime = %file.mime_type, "file type rejected");
            return Err(Failure::for_file(
                FailureKind::RejectedFileType,
                "file type is not accepted",
                &file.name,
            ));
        }

        let events_tx = self.inner.events_tx.clone();
        let handlers = handlers.on_any(move |event| {
            // The receiver may have been dropped.
            let _ = events_tx.send(OrchestratorEvent::File(event.clone()));
        });
        let file_name = file.name.clone();
        let manager = Arc::new(UploadManager::new(
            self.inner.ctx.clone(),
            file,
            metadata,
            handlers,
        ));
        let snapshot = manager.snapshot();

        {
            let mut reg = self.inner.lock();
            if reg.queue.find_by_id(manager.id()).is_some() {
                info!(id = %manager.id(), file = %file_name, "duplicate file rejected");
                return Err(Failure::for_file(
                    FailureKind::DuplicateFile,
                    "file is already in the upload list",
                    &file_name,
                ));
            }
            reg.queue.append(Arc::clone(&manager));
            if self.inner.ctx.config.auto_start {
                reg.waiting.insert(manager.id().to_string());
            }
        }
        info!(id = %snapshot.id, file = %file_name, size = snapshot.size, "file added");

        if self.inner.ctx.config.auto_start {
            self.inner.pump();
        }
        Ok(snapshot)
    }

    /// Stops tracking a file, cancelling its transfer if one is running.
    ///
    /// The cancelled transfer emits no `FileStopped`, and the file's
    /// checkpoint is discarded.
    pub fn remove_file(&self, id: &str) -> Result<UploadSnapshot, UploadError> {
        let manager = {
            let mut reg = self.inner.lock();
            reg.waiting.remove(id);
            reg.queue
                .remove_by_id(id)
                .ok_or_else(|| UploadError::UnknownFile(id.to_string()))?
        };
        let snapshot = manager.snapshot();
        if !manager.detach() {
            // Nothing in flight; a settling run also deletes it.
            self.inner.ctx.store.delete(id);
        }
        info!(id, "file removed");

        self.inner.pump();
        Ok(snapshot)
    }

    /// Queues one file for admission.
    pub fn start_file(&self, id: &str) -> Result<(), UploadError> {
        {
            let mut reg = self.inner.lock();
            let status = reg
                .queue
                .find_by_id(id)
                .map(|m| m.status())
                .ok_or_else(|| UploadError::UnknownFile(id.to_string()))?;
            if !matches!(status, UploadStatus::NotStarted | UploadStatus::Paused) {
                debug!(id, %status, "start ignored");
                return Ok(());
            }
            reg.waiting.insert(id.to_string());
        }
        self.inner.pump();
        Ok(())
    }

    /// Pauses one file, or withdraws it from the admission queue.
    ///
    /// Returns whether a running upload was stopped.
    pub fn stop_file(&self, id: &str) -> Result<bool, UploadError> {
        let manager = {
            let mut reg = self.inner.lock();
            reg.waiting.remove(id);
            reg.queue
                .find_by_id(id)
                .cloned()
                .ok_or_else(|| UploadError::UnknownFile(id.to_string()))?
        };
        Ok(manager.stop())
    }

    /// Queues every startable file, in submission order.
    pub fn start_all(&self) {
        {
            let mut reg = self.inner.lock();
            let reg = &mut *reg;
            for manager in reg.queue.iter() {
                if matches!(
                    manager.status(),
                    UploadStatus::NotStarted | UploadStatus::Paused
                ) {
                    reg.waiting.insert(manager.id().to_string());
                }
            }
        }
        self.inner.pump();
    }

    /// Pauses every running file and empties the admission queue.
    pub fn stop_all(&self) {
        let managers = {
            let mut reg = self.inner.lock();
            reg.waiting.clear();
            reg.queue.snapshot()
        };
        let stopped = managers.iter().filter(|m| m.stop()).count();
        info!(stopped, "all uploads stopped");
    }

    /// Cancels everything and forgets every tracked file and checkpoint.
    pub fn clear_all(&self) {
        let managers = {
            let mut reg = self.inner.lock();
            reg.waiting.clear();
            let managers = reg.queue.snapshot();
            reg.queue.clear();
            managers
        };
        for manager in &managers {
            if !manager.detach() {
                self.inner.ctx.store.delete(manager.id());
            }
        }
        info!(count = managers.len(), "upload list cleared");
    }

    /// Merges a metadata change into one file.
    pub fn update_file_data(&self, id: &str, update: MetadataUpdate) -> Result<(), UploadError> {
        let manager = self
            .inner
            .find(id)
            .ok_or_else(|| UploadError::UnknownFile(id.to_string()))?;
        manager.update_metadata(update);
        Ok(())
    }

    /// Snapshots of every tracked file in submission order.
    pub fn files(&self) -> Vec<UploadSnapshot> {
        let managers = self.inner.lock().queue.snapshot();
        managers.iter().map(|m| m.snapshot()).collect()
    }

    pub fn file(&self, id: &str) -> Option<UploadSnapshot> {
        self.inner.find(id).map(|m| m.snapshot())
    }

    /// Number of admitted runs that have not settled yet.
    ///
    /// A stopped or removed upload keeps its slot until its transfer has
    /// acknowledged the cancellation.
    pub fn running_count(&self) -> usize {
        self.inner.lock().running.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, id: &str) -> Option<Arc<UploadManager>> {
        self.lock().queue.find_by_id(id).cloned()
    }

    /// Admits waiting entries in submission order until the limit is hit.
    fn pump(self: &Arc<Self>) {
        let limit = self.ctx.config.parallel_file_limit.unwrap_or(usize::MAX);
        let admitted = {
            let mut reg = self.lock();
            let reg = &mut *reg;
            // A file whose previous run is still unwinding waits for it.
            let candidates: Vec<Arc<UploadManager>> = reg
                .queue
                .iter()
                .filter(|m| reg.waiting.contains(m.id()) && !reg.running.contains(m.id()))
                .cloned()
                .collect();

            let mut admitted = Vec::new();
            for manager in candidates {
                if reg.running.len() >= limit {
                    break;
                }
                reg.waiting.remove(manager.id());
                if manager.begin() {
                    reg.running.insert(manager.id().to_string());
                    admitted.push(manager);
                }
            }
            if !admitted.is_empty() {
                reg.settled = false;
            }
            admitted
        };

        for manager in admitted {
            debug!(id = %manager.id(), "admitted");
            self.spawn_run(manager);
        }
    }

    fn spawn_run(self: &Arc<Self>, manager: Arc<UploadManager>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let id = manager.id().to_string();
            match manager.run().await {
                Ok(outcome) => debug!(id = %id, ?outcome, "run settled"),
                Err(e) => {
                    error!(id = %id, error = %e, "upload run aborted");
                    let _ = inner.events_tx.send(OrchestratorEvent::Fatal {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
            inner.lock().running.remove(&id);
            inner.pump();
            inner.notify_if_settled();
        });
    }

    fn notify_if_settled(&self) {
        let notify = {
            let mut reg = self.lock();
            let idle = reg.waiting.is_empty() && reg.running.is_empty();
            let notify = idle && !reg.settled;
            if notify {
                reg.settled = true;
            }
            notify
        };
        if notify {
            info!("all uploads settled");
            let _ = self.events_tx.send(OrchestratorEvent::AllSettled);
        }
    }
}
