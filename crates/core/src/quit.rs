//! Cooperative shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable flag polled once per loop iteration.
///
/// Requesting a quit never interrupts work in progress; the owner of the
/// loop observes the flag at the next iteration boundary and shuts down
/// from there.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag {
    requested: Arc<AtomicBool>,
}

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop at its next iteration boundary.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns true once a quit has been requested by any clone.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_flag_shared_between_clones() {
        let flag = QuitFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_requested());

        flag.request();
        assert!(observer.is_requested());

        flag.request();
        assert!(observer.is_requested());
    }
}
