//! Single-slot "latest value wins" cell.
//!
//! Writers overwrite, the reader swaps the value out. There is never more
//! than one value waiting, so a burst of requests collapses to the newest.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

#[derive(Debug)]
pub struct LatestSlot<T> {
    inner: ArcSwapOption<T>,
}

impl<T> LatestSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: ArcSwapOption::empty(),
        }
    }

    /// Store `value`; returns `true` if it displaced an unread one.
    pub fn put(&self, value: T) -> bool {
        self.inner.swap(Some(Arc::new(value))).is_some()
    }

    pub fn take(&self) -> Option<Arc<T>> {
        self.inner.swap(None)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_none()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_newest_survives() {
        let slot = LatestSlot::new();

        assert!(!slot.put(1));
        assert!(slot.put(2));
        assert!(slot.put(3));

        assert_eq!(slot.take().as_deref(), Some(&3));
        assert!(slot.is_empty());
        assert!(slot.take().is_none());
    }
}
