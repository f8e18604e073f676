//! Mock collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use vidup_protocol::{
    ApiResponse, InitUploadData, InitUploadRequest, StorageGrant, UploadCallback, UserCredentials,
};
use vidup_transfer::{
    BlobTransfer, Checkpoint, CompletedPart, MemoryStore, SourceFile, StorageCredentials,
    TransferFailure, TransferFuture, TransferRequest,
};

use crate::config::{OrchestratorConfig, RetryConfig};
use crate::control::{ControlFuture, ControlPlane};
use crate::error::ControlPlaneError;
use crate::manager::UploadContext;
use crate::types::{FileEventHandlers, UploadEvent};

pub(crate) fn user() -> UserCredentials {
    UserCredentials {
        user_id: "user-1".into(),
        ptime: 1_700_000_000_000,
        sign: "signature".into(),
        hash: "hash".into(),
    }
}

pub(crate) fn source(name: &str, size: u64) -> SourceFile {
    SourceFile::from_parts(format!("/media/{name}"), name, "video/mp4", size)
}

pub(crate) fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryConfig::immediate(),
        ..OrchestratorConfig::default()
    }
}

pub(crate) fn grant(access_id: &str) -> StorageGrant {
    StorageGrant {
        domain: "oss.example.com".into(),
        bucket_name: "videos".into(),
        access_id: access_id.into(),
        access_key: "secret".into(),
        token: "sts".into(),
    }
}

pub(crate) fn init_ok(vid: &str, remain_space: i64) -> ApiResponse<InitUploadData> {
    ApiResponse {
        code: 200,
        status: "success".into(),
        message: String::new(),
        data: Some(InitUploadData {
            vid: vid.into(),
            remain_space,
            dir: "videos/".into(),
            grant: grant("AK1"),
            callback: None,
        }),
    }
}

pub(crate) fn refresh_ok(access_id: &str) -> ApiResponse<StorageGrant> {
    ApiResponse {
        code: 200,
        status: "success".into(),
        message: String::new(),
        data: Some(grant(access_id)),
    }
}

// ---------------------------------------------------------------------------
// Control plane
// ---------------------------------------------------------------------------

type InitResult = Result<ApiResponse<InitUploadData>, ControlPlaneError>;
type RefreshResult = Result<ApiResponse<StorageGrant>, ControlPlaneError>;

/// Scripted control plane. Unscripted initiate calls succeed with video id
/// `vid<n>`; unscripted refresh calls succeed with access id `AK-refresh`.
#[derive(Default)]
pub(crate) struct MockControl {
    init: Mutex<VecDeque<InitResult>>,
    refresh: Mutex<VecDeque<RefreshResult>>,
    requests: Mutex<Vec<InitUploadRequest>>,
    pub(crate) init_calls: AtomicUsize,
    pub(crate) refresh_calls: AtomicUsize,
}

impl MockControl {
    pub(crate) fn push_init(&self, result: InitResult) {
        self.init.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_refresh(&self, result: RefreshResult) {
        self.refresh.lock().unwrap().push_back(result);
    }

    pub(crate) fn requests(&self) -> Vec<InitUploadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ControlPlane for MockControl {
    fn initiate(
        &self,
        _user: UserCredentials,
        request: InitUploadRequest,
    ) -> ControlFuture<'_, InitUploadData> {
        Box::pin(async move {
            let n = self.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request);
            let scripted = self.init.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(init_ok(&format!("vid{n}"), i64::MAX)))
        })
    }

    fn refresh_credentials(&self, _user: UserCredentials) -> ControlFuture<'_, StorageGrant> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self.refresh.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(refresh_ok("AK-refresh")))
        })
    }
}

// ---------------------------------------------------------------------------
// Blob transfer
// ---------------------------------------------------------------------------

/// How a scripted transfer call ends.
#[derive(Debug, Clone)]
pub(crate) enum End {
    Succeed,
    Fail(TransferFailure),
    /// Waits for [`MockTransfer::release`] or cancellation.
    Hold,
    /// Waits for cancellation, then takes this long to acknowledge it.
    SlowCancel(Duration),
}

#[derive(Debug, Clone)]
pub(crate) struct Step {
    progress: Vec<f64>,
    end: End,
}

impl Step {
    pub(crate) fn end(end: End) -> Self {
        Self {
            progress: Vec::new(),
            end,
        }
    }

    pub(crate) fn progress(progress: Vec<f64>, end: End) -> Self {
        Self { progress, end }
    }
}

/// A recorded transfer call.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub(crate) file_name: String,
    pub(crate) object_name: String,
    pub(crate) part_size: u64,
    pub(crate) checkpoint: Option<Checkpoint>,
    pub(crate) callback: Option<UploadCallback>,
    pub(crate) access_key_id: String,
    pub(crate) secure: bool,
    pub(crate) cancelled: bool,
}

/// Scripted transfer backend that records its calls and tracks how many
/// run at once.
pub(crate) struct MockTransfer {
    script: Mutex<VecDeque<Step>>,
    fallback: End,
    calls: Mutex<Vec<Call>>,
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self::always(End::Succeed)
    }
}

impl MockTransfer {
    pub(crate) fn always(end: End) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: end,
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn scripted(steps: Vec<Step>) -> Self {
        let mock = Self::default();
        *mock.script.lock().unwrap() = steps.into();
        mock
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn was_cancelled(&self, call: usize) -> bool {
        self.calls.lock().unwrap()[call].cancelled
    }

    /// Lets `n` held transfers finish, oldest first.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_calls(&self, n: usize) {
        wait_until(|| self.calls.lock().unwrap().len() >= n).await;
    }

    fn record(&self, credentials: &StorageCredentials, request: &TransferRequest) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call {
            file_name: request.file.name.clone(),
            object_name: request.object_name.clone(),
            part_size: request.part_size,
            checkpoint: request.checkpoint.clone(),
            callback: request.callback.clone(),
            access_key_id: credentials.access_key_id.clone(),
            secure: credentials.secure,
            cancelled: false,
        });
        calls.len() - 1
    }

    fn mark_cancelled(&self, call: usize) -> Result<(), TransferFailure> {
        self.calls.lock().unwrap()[call].cancelled = true;
        Err(TransferFailure::Cancelled)
    }
}

struct ActiveGuard<'a>(&'a MockTransfer);

impl<'a> ActiveGuard<'a> {
    fn enter(mock: &'a MockTransfer) -> Self {
        let now = mock.active.fetch_add(1, Ordering::SeqCst) + 1;
        mock.max_active.fetch_max(now, Ordering::SeqCst);
        Self(mock)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Checkpoint whose completed part count is a tenth of `fraction`.
fn mock_checkpoint(request: &TransferRequest, fraction: f64) -> Checkpoint {
    let mut cp = Checkpoint::new(
        "mock-session".into(),
        request.object_name.clone(),
        request.file.size,
        request.part_size,
    );
    let parts = (fraction * 10.0).round() as u32;
    cp.done_parts = (1..=parts)
        .map(|number| CompletedPart {
            number,
            etag: format!("etag-{number}"),
        })
        .collect();
    cp
}

impl BlobTransfer for MockTransfer {
    fn upload(
        &self,
        credentials: StorageCredentials,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> TransferFuture<'_> {
        Box::pin(async move {
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Step::end(self.fallback.clone()));
            let call = self.record(&credentials, &request);
            let _active = ActiveGuard::enter(self);

            for fraction in step.progress {
                if cancel.is_cancelled() {
                    return self.mark_cancelled(call);
                }
                if let Some(progress) = &request.progress {
                    progress(fraction, mock_checkpoint(&request, fraction));
                }
                tokio::task::yield_now().await;
            }

            match step.end {
                End::Succeed => Ok(()),
                End::Fail(failure) => Err(failure),
                End::Hold => tokio::select! {
                    _ = cancel.cancelled() => self.mark_cancelled(call),
                    permit = self.gate.acquire() => match permit {
                        Ok(permit) => {
                            permit.forget();
                            Ok(())
                        }
                        Err(_) => Err(TransferFailure::Other("gate closed".into())),
                    },
                },
                End::SlowCancel(linger) => {
                    cancel.cancelled().await;
                    tokio::time::sleep(linger).await;
                    self.mark_cancelled(call)
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub(crate) control: Arc<MockControl>,
    pub(crate) transfer: Arc<MockTransfer>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) config: OrchestratorConfig,
}

impl Harness {
    pub(crate) fn new(transfer: MockTransfer) -> Self {
        Self::with_config(transfer, test_config())
    }

    pub(crate) fn with_config(transfer: MockTransfer, config: OrchestratorConfig) -> Self {
        Self {
            control: Arc::new(MockControl::default()),
            transfer: Arc::new(transfer),
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    pub(crate) fn context(&self) -> UploadContext {
        UploadContext::new(
            self.control.clone(),
            self.transfer.clone(),
            self.store.clone(),
            user(),
            self.config.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Event recording
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<UploadEvent>>>);

impl EventLog {
    pub(crate) fn events(&self) -> Vec<UploadEvent> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| format!("{:?}", e.kind()))
            .collect()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| *k == kind).count()
    }

    pub(crate) fn progress(&self) -> Vec<f64> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                UploadEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    pub(crate) async fn wait_for(&self, kind: &str) {
        wait_until(|| self.count(kind) > 0).await;
    }
}

pub(crate) fn recorder() -> (FileEventHandlers, EventLog) {
    let log = EventLog::default();
    let sink = log.clone();
    let handlers = FileEventHandlers::new().on_any(move |e| sink.0.lock().unwrap().push(e.clone()));
    (handlers, log)
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
