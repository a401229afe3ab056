// Cleanup for multi-step creation
//
// Each created handle gets a guard that destroys it if a later step fails.
// Once everything is owned by its final struct the guards are disarmed.

/// Runs `cleanup` on drop unless disarmed
pub struct CleanupGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> CleanupGuard<F> {
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Keep the resource alive; ownership moved elsewhere
    pub fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for CleanupGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn runs_when_dropped() {
        let ran = RefCell::new(false);
        {
            let _guard = CleanupGuard::new(|| *ran.borrow_mut() = true);
        }
        assert!(*ran.borrow());
    }

    #[test]
    fn disarmed_guard_does_nothing() {
        let ran = RefCell::new(false);
        let guard = CleanupGuard::new(|| *ran.borrow_mut() = true);
        guard.disarm();
        assert!(!*ran.borrow());
    }

    #[test]
    fn later_steps_are_undone_first() {
        let order = RefCell::new(Vec::new());
        let fail_after_two = || -> Result<(), &'static str> {
            let _instance = CleanupGuard::new(|| order.borrow_mut().push("instance"));
            let _surface = CleanupGuard::new(|| order.borrow_mut().push("surface"));
            Err("device creation failed")
        };

        assert!(fail_after_two().is_err());
        assert_eq!(*order.borrow(), ["surface", "instance"]);
    }
}
