use std::path::{Component, Path};

use crate::TransferError;

/// Validates a storage object name before it is used as a key under a
/// bucket root.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
/// - Names that end in a separator (no file component)
pub fn validate_object_name(object_name: &str) -> Result<(), TransferError> {
    if object_name.is_empty() {
        return Err(TransferError::InvalidPath("empty object name".into()));
    }

    if object_name.ends_with('/') || object_name.ends_with('\\') {
        return Err(TransferError::InvalidPath(format!(
            "object name has no file component: {object_name}"
        )));
    }

    let path = Path::new(object_name);

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute object name not allowed: {object_name}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {object_name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute object name not allowed: {object_name}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
