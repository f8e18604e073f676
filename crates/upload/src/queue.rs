//! Ordered registry of tracked uploads.
//!
//! Insertion order doubles as submission order, which the admission
//! scheduler walks front to back. Every operation is a linear scan; the
//! registry holds tens of entries, not millions.

use std::sync::Arc;

/// Something addressable by a stable string id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl<T: Identified + ?Sized> Identified for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}

/// FIFO-ordered collection keyed by [`Identified::id`].
///
/// Uniqueness is not enforced here; callers deduplicate on submission.
#[derive(Debug, Clone)]
pub struct UploadQueue<T> {
    items: Vec<T>,
}

impl<T> Default for UploadQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Identified> UploadQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item` at the tail.
    pub fn append(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes and returns the first item with `id`.
    pub fn remove_by_id(&mut self, id: &str) -> Option<T> {
        let idx = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(idx))
    }

    /// Returns the first item with `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Copies the current contents in order.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.clone()
    }

    /// Empties the registry. In-flight transfers are not touched.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
