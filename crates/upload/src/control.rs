//! Control-plane trait.
//!
//! The embedder implements [`ControlPlane`] over its HTTP stack. A
//! non-success envelope is an ordinary `Ok` value; `Err` is reserved for
//! transport failures.

use std::future::Future;
use std::pin::Pin;

use vidup_protocol::{ApiResponse, InitUploadData, InitUploadRequest, StorageGrant, UserCredentials};

use crate::error::ControlPlaneError;

/// Future returned by [`ControlPlane`] calls.
pub type ControlFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<ApiResponse<T>, ControlPlaneError>> + Send + 'a>>;

/// Remote service that registers videos and issues storage credentials.
pub trait ControlPlane: Send + Sync {
    /// Registers a new video and returns its storage coordinates.
    fn initiate(
        &self,
        user: UserCredentials,
        request: InitUploadRequest,
    ) -> ControlFuture<'_, InitUploadData>;

    /// Issues fresh storage credentials for `user`.
    fn refresh_credentials(&self, user: UserCredentials) -> ControlFuture<'_, StorageGrant>;
}
