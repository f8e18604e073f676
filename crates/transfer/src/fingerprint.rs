use crate::chunked::checksum_bytes;

/// Derives the stable identity of a (user, category, file) triple.
///
/// The id is a SHA-256 over the user id, category id, file name, MIME type
/// and byte size. It depends on nothing else, so the same file re-added
/// after a restart maps to the same tracked upload and checkpoint.
pub fn fingerprint(
    user_id: &str,
    category_id: i64,
    file_name: &str,
    mime_type: &str,
    size: u64,
) -> String {
    // NUL-separated so that field boundaries cannot be shifted.
    let material = format!("vidup\0{user_id}\0{category_id}\0{file_name}\0{mime_type}\0{size}");
    checksum_bytes(material.as_bytes())
}
