use serde::{Deserialize, Serialize};

/// A part confirmed by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number.
    pub number: u32,
    /// Backend-assigned tag (SHA-256 of the part for the local backend).
    pub etag: String,
}

/// Resumable progress of one multipart transfer.
///
/// Owned by the transfer client: the orchestrator only persists it, hands
/// it back on restart, and deletes it once the transfer is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Backend multipart session id.
    pub session_id: String,
    pub object_name: String,
    pub file_size: u64,
    pub part_size: u64,
    #[serde(default)]
    pub done_parts: Vec<CompletedPart>,
}

impl Checkpoint {
    /// Creates an empty checkpoint for a new session.
    pub fn new(session_id: String, object_name: String, file_size: u64, part_size: u64) -> Self {
        Self {
            session_id,
            object_name,
            file_size,
            part_size,
            done_parts: Vec::new(),
        }
    }

    /// Total number of parts for this file.
    pub fn part_count(&self) -> u32 {
        if self.part_size == 0 {
            return 0;
        }
        self.file_size.div_ceil(self.part_size) as u32
    }

    /// Byte length of part `number` (1-based).
    pub fn part_len(&self, number: u32) -> u64 {
        let start = u64::from(number.saturating_sub(1)) * self.part_size;
        self.file_size.saturating_sub(start).min(self.part_size)
    }

    /// Bytes covered by completed parts.
    pub fn completed_bytes(&self) -> u64 {
        self.done_parts.iter().map(|p| self.part_len(p.number)).sum()
    }

    /// Fraction of the file confirmed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.file_size == 0 {
            return 1.0;
        }
        (self.completed_bytes() as f64 / self.file_size as f64).min(1.0)
    }

    /// Whether this checkpoint can resume a transfer of `object_name`
    /// with the given geometry.
    pub fn matches(&self, object_name: &str, file_size: u64, part_size: u64) -> bool {
        self.object_name == object_name
            && self.file_size == file_size
            && self.part_size == part_size
    }
}
