use serde::{Deserialize, Serialize};

use crate::types::{StorageGrant, UserCredentials};
use crate::{CODE_OK, STATUS_SUCCESS, UPLOAD_TYPE};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Form body of the initiate call that registers a new video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub ptime: i64,
    pub sign: String,
    pub hash: String,
    pub title: String,
    #[serde(rename = "describ")]
    pub description: String,
    #[serde(rename = "cataid")]
    pub category_id: i64,
    pub tag: String,
    /// Screen-recording flag (0/1).
    #[serde(rename = "luping")]
    pub screen_recording: u8,
    /// Keep-source flag (0/1).
    #[serde(rename = "keepsource")]
    pub keep_source: u8,
    #[serde(rename = "filesize")]
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    /// Always 1: the control plane allocates the video id.
    #[serde(rename = "autoid")]
    pub auto_id: u8,
    pub upload_type: String,
    pub compatible: u8,
}

impl InitUploadRequest {
    /// Creates a request carrying `user`'s signature; descriptive fields
    /// start empty and are filled in by the caller.
    pub fn signed(user: &UserCredentials, file_size: u64) -> Self {
        Self {
            ptime: user.ptime,
            sign: user.sign.clone(),
            hash: user.hash.clone(),
            title: String::new(),
            description: String::new(),
            category_id: 1,
            tag: String::new(),
            screen_recording: 0,
            keep_source: 0,
            file_size,
            state: String::new(),
            auto_id: 1,
            upload_type: UPLOAD_TYPE.into(),
            compatible: 1,
        }
    }
}

/// Query parameters of the credential refresh call.
pub fn token_query(user: &UserCredentials) -> Vec<(&'static str, String)> {
    vec![
        ("ptime", user.ptime.to_string()),
        ("sign", user.sign.clone()),
        ("hash", user.hash.clone()),
        ("compatible", "1".into()),
    ]
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response envelope shared by all control-plane endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Builds a non-success envelope, e.g. for an HTTP error without a body.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            status: "error".into(),
            message: message.into(),
            data: None,
        }
    }

    /// Whether `code` reports success (initiate semantics).
    pub fn code_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Whether `status` reports success (credential refresh semantics).
    pub fn status_ok(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Payload of a successful initiate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadData {
    /// Video id allocated by the platform.
    pub vid: String,
    /// Remaining account quota in bytes.
    pub remain_space: i64,
    /// Object-name prefix for this video.
    #[serde(default)]
    pub dir: String,
    #[serde(flatten)]
    pub grant: StorageGrant,
    /// JSON-encoded [`UploadCallback`](crate::UploadCallback), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}
