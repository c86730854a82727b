use std::sync::atomic::{AtomicBool, Ordering};

/// In-flight flag that keeps two ticks of the same job from overlapping
#[derive(Debug, Default)]
pub struct TickGuard {
    running: AtomicBool,
}

/// Held for the duration of a tick; clears the flag on drop
#[derive(Debug)]
pub struct TickToken<'a> {
    guard: &'a TickGuard,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// None if a tick is already running
    pub fn try_begin(&self) -> Option<TickToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickToken { guard: self })
    }
}

impl Drop for TickToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_tick_is_rejected_until_first_ends() {
        let guard = TickGuard::new();
        let first = guard.try_begin();
        assert!(first.is_some());
        assert!(guard.try_begin().is_none());

        drop(first);
        assert!(guard.try_begin().is_some());
    }
}
