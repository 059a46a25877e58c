//! Cross-thread notification that debugger input is waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloned into the transport's reader thread; the CPU loop polls it between
/// instructions.
#[derive(Debug, Clone, Default)]
pub struct Events {
    message: Arc<AtomicBool>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_message(&self) {
        self.message.store(true, Ordering::Release);
    }

    pub fn has_message(&self) -> bool {
        self.message.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was set.
    pub fn take_message(&self) -> bool {
        self.message.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_flag_crosses_threads() {
        let events = Events::new();
        assert!(!events.has_message());

        let remote = events.clone();
        thread::spawn(move || remote.notify_message()).join().unwrap();

        assert!(events.has_message());
        assert!(events.take_message());
        assert!(!events.take_message());
        assert!(!events.has_message());
    }
}
