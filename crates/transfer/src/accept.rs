/// Media types and extensions the video platform accepts.
pub const DEFAULT_ACCEPTED_TYPES: &[&str] = &[
    "video/avi", ".avi", ".f4v", "video/mpeg", ".mpg", "video/mp4", ".mp4", "video/x-flv", ".flv",
    "video/x-ms-wmv", ".wmv", "video/quicktime", ".mov", "video/3gpp", ".3gp", ".rmvb",
    "video/x-matroska", ".mkv", ".asf", ".264", ".ts", ".mts", ".dat", ".vob", "audio/mpeg",
    ".mp3", "audio/x-wav", ".wav", "video/x-m4v", ".m4v", "video/webm", ".webm", ".mod",
];

/// Decides which submitted files may be tracked.
///
/// A file passes when its MIME type or extension is in the built-in list
/// and, if the embedder configured an extra list, also in that list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptPolicy {
    extra: Option<Vec<String>>,
}

impl AcceptPolicy {
    /// Builds a policy from an optional comma-separated extra allow-list
    /// (e.g. `"video/mp4,.mov"`). An empty list means no extra restriction.
    pub fn new(extra: Option<&str>) -> Self {
        let extra = extra
            .map(|list| {
                list.split(',')
                    .map(|entry| entry.trim().to_ascii_lowercase())
                    .filter(|entry| !entry.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty());
        Self { extra }
    }

    /// Whether a file with this name and MIME type is accepted.
    pub fn is_accepted(&self, file_name: &str, mime_type: &str) -> bool {
        let mime = mime_type.trim().to_ascii_lowercase();
        let ext = extension(file_name).map(str::to_ascii_lowercase);

        let in_default = DEFAULT_ACCEPTED_TYPES
            .iter()
            .any(|entry| matches_entry(entry, &mime, ext.as_deref()));
        let in_extra = self.extra.as_ref().is_none_or(|list| {
            list.iter()
                .any(|entry| matches_entry(entry, &mime, ext.as_deref()))
        });
        in_default && in_extra
    }
}

fn matches_entry(entry: &str, mime: &str, ext: Option<&str>) -> bool {
    (!mime.is_empty() && entry == mime) || ext.is_some_and(|ext| entry == ext)
}

/// Returns the final `.ext` of a file name, dot included.
///
/// A leading dot (hidden file) or a trailing dot is not an extension.
fn extension(file_name: &str) -> Option<&str> {
    let idx = file_name.rfind('.')?;
    if idx == 0 || idx + 1 == file_name.len() {
        return None;
    }
    Some(&file_name[idx..])
}
