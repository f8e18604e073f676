//! Failure taxonomy and error types.

use serde::Serialize;

/// Classification of an expected upload failure.
///
/// Each kind carries a stable numeric code so callers can branch on it
/// without matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// Control-plane call failed or returned a non-success envelope.
    NetworkError,
    /// The file is larger than the account's remaining space.
    QuotaExceeded,
    /// Local pause or removal. Settles as a pause, never as a failure;
    /// the code is reserved for callers that map outcomes to codes.
    Cancelled,
    /// The backend lost the multipart session and no retries remain.
    SessionExpired,
    /// Storage credentials were rejected and no retries remain.
    CredentialsExpired,
    /// Any other transfer error after retries ran out.
    TransientTransferError,
    /// A file with the same fingerprint is already tracked.
    DuplicateFile,
    /// The file's type is not accepted.
    RejectedFileType,
}

impl FailureKind {
    /// Stable numeric code.
    pub fn code(self) -> u16 {
        match self {
            Self::NetworkError => 101,
            Self::QuotaExceeded => 102,
            Self::Cancelled => 104,
            Self::SessionExpired => 105,
            Self::CredentialsExpired => 106,
            Self::TransientTransferError => 107,
            Self::DuplicateFile => 110,
            Self::RejectedFileType => 111,
        }
    }
}

/// A classified, expected failure with a user-presentable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("[{}] {message}", .kind.code())]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Set for failures that reject a submitted file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_name: None,
        }
    }

    /// A failure rejecting the submitted file `file_name`.
    pub fn for_file(kind: FailureKind, message: impl Into<String>, file_name: &str) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            ..Self::new(kind, message)
        }
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }
}

/// Transport-level failure talking to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("control plane unreachable: {0}")]
    Transport(String),

    #[error("invalid control plane response: {0}")]
    InvalidResponse(String),
}

/// Errors that escape the handled-outcome channel.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Renewing storage credentials failed at the transport level.
    #[error("credential refresh failed for {id}: {source}")]
    CredentialRefresh {
        id: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("no tracked upload with id {0}")]
    UnknownFile(String),
}

/// Errors loading orchestrator configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
