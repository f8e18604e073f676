//! Wire types exchanged with the video platform's control plane.
//!
//! The control plane registers a video before its bytes are sent and
//! hands out short-lived object-storage credentials. Its responses use a
//! `{code, status, message, data}` envelope; a non-success envelope is a
//! normal outcome the caller inspects, not a transport error.

pub mod messages;
pub mod types;

pub use messages::{ApiResponse, InitUploadData, InitUploadRequest, token_query};
pub use types::{StorageGrant, UploadCallback, UserCredentials};

/// Envelope `code` of a successful initiate call.
pub const CODE_OK: i32 = 200;

/// Envelope `status` of a successful credential refresh.
pub const STATUS_SUCCESS: &str = "success";

/// `uploadType` reported to the control plane.
pub const UPLOAD_TYPE: &str = "rust_sdk_chunk_v1";
