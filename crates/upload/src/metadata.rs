//! Descriptive video metadata and its sanitization rules.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use vidup_protocol::InitUploadRequest;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<.+?>").expect("tag pattern is a valid regex"));

/// Strips angle-bracket tag sequences (`<b>`, `</script>`) from `text`.
pub fn sanitize(text: &str) -> String {
    TAG_PATTERN.replace_all(text, "").into_owned()
}

/// Descriptive fields sent with the initiate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub category_id: i64,
    /// Comma-separated tags.
    pub tag: String,
    pub screen_recording: bool,
    /// Keep the source file alongside transcoded renditions.
    pub keep_source: bool,
    /// Opaque value echoed back by the platform's callbacks.
    pub state: String,
}

impl VideoMetadata {
    /// Defaults for a newly added file: the title is the file name without
    /// its final extension.
    pub fn for_file(file_name: &str) -> Self {
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };
        Self {
            title: sanitize(stem),
            description: String::new(),
            category_id: 1,
            tag: String::new(),
            screen_recording: false,
            keep_source: false,
            state: String::new(),
        }
    }

    /// Merges `update` field by field.
    ///
    /// String fields are sanitized. A title that is empty or whitespace-only,
    /// before or after sanitizing, is ignored.
    pub fn apply(&mut self, update: MetadataUpdate) {
        if let Some(title) = update.title {
            let cleaned = sanitize(title.trim());
            if !cleaned.trim().is_empty() {
                self.title = cleaned;
            }
        }
        if let Some(description) = update.description {
            self.description = sanitize(&description);
        }
        if let Some(category_id) = update.category_id {
            self.category_id = category_id;
        }
        if let Some(tag) = update.tag {
            self.tag = sanitize(&tag);
        }
        if let Some(flag) = update.screen_recording {
            self.screen_recording = flag;
        }
        if let Some(flag) = update.keep_source {
            self.keep_source = flag;
        }
        if let Some(state) = update.state {
            self.state = state;
        }
    }

    /// Copies the descriptive fields into an initiate request.
    pub fn fill_request(&self, request: &mut InitUploadRequest) {
        request.title = self.title.clone();
        request.description = self.description.clone();
        request.category_id = self.category_id;
        request.tag = self.tag.clone();
        request.screen_recording = u8::from(self.screen_recording);
        request.keep_source = u8::from(self.keep_source);
        request.state = self.state.clone();
    }
}

/// A partial metadata change; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub tag: Option<String>,
    pub screen_recording: Option<bool>,
    pub keep_source: Option<bool>,
    pub state: Option<String>,
}

impl MetadataUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}
