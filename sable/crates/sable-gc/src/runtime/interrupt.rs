//! Interrupt masking
//!
//! The collector rewrites flags, class pointers and free lists in place. A
//! signal handler that reentered the runtime halfway through would see a
//! graph in an intermediate state, so `collect` and out-of-band disposal
//! block SIGINT and SIGQUIT on the calling thread while they run. Pending
//! signals are delivered as soon as the previous mask is restored.

/// Blocks asynchronous interrupts for its lifetime
///
/// No-op when constructed disabled, and on non-Unix targets.
pub struct InterruptGuard {
    #[cfg(unix)]
    previous: Option<libc::sigset_t>,
}

impl InterruptGuard {
    #[cfg(unix)]
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { previous: None };
        }

        // SAFETY: both sets are initialised by sigemptyset / pthread_sigmask
        // before being read, and only the calling thread's mask changes.
        let previous = unsafe {
            let mut block: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut block);
            libc::sigaddset(&mut block, libc::SIGINT);
            libc::sigaddset(&mut block, libc::SIGQUIT);

            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &block, &mut previous);
            if rc == 0 {
                Some(previous)
            } else {
                log::warn!("could not mask interrupts (pthread_sigmask returned {})", rc);
                None
            }
        };

        Self { previous }
    }

    #[cfg(not(unix))]
    pub fn new(_enabled: bool) -> Self {
        Self {}
    }

    /// Whether interrupts are currently held back by this guard
    pub fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.previous.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(previous) = self.previous.take() {
            // SAFETY: `previous` was filled in by pthread_sigmask in `new`.
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, &previous, std::ptr::null_mut());
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sigint_blocked() -> bool {
        unsafe {
            let mut current: libc::sigset_t = std::mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, std::ptr::null(), &mut current);
            libc::sigismember(&current, libc::SIGINT) == 1
        }
    }

    #[test]
    fn test_guard_blocks_and_restores() {
        let before = sigint_blocked();
        {
            let guard = InterruptGuard::new(true);
            assert!(guard.is_active());
            assert!(sigint_blocked());
        }
        assert_eq!(sigint_blocked(), before);
    }

    #[test]
    fn test_disabled_guard_is_inert() {
        let guard = InterruptGuard::new(false);
        assert!(!guard.is_active());
    }
}
