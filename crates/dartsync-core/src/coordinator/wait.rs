use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight guard for the "wait for next match" cycle.
///
/// The reset callback takes the token before queueing any work; a reset
/// that arrives while a cycle is queued or running is dropped, not queued.
#[derive(Debug, Clone, Default)]
pub struct WaitToken(Arc<AtomicBool>);

impl WaitToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the token, or `None` if a cycle already holds it.
    pub fn try_acquire(&self) -> Option<WaitGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| WaitGuard(Arc::clone(&self.0)))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`WaitToken`]. Releases it on drop, whichever way
/// the cycle ends.
#[derive(Debug)]
pub struct WaitGuard(Arc<AtomicBool>);

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_holder() {
        let token = WaitToken::new();
        let guard = token.try_acquire();
        assert!(guard.is_some());
        assert!(token.is_held());
        assert!(token.try_acquire().is_none());

        drop(guard);
        assert!(!token.is_held());
        assert!(token.try_acquire().is_some());
    }

    #[test]
    fn released_on_panic_unwind() {
        let token = WaitToken::new();
        let inner = token.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.try_acquire();
            panic!("cycle failed");
        });
        assert!(result.is_err());
        assert!(!token.is_held());
    }
}
