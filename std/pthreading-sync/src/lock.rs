//!
//! Lock Interface
//!
//! [`Lock`] is the object-safe surface shared by every lock in the threading
//! API: blocking and non-blocking `acquire`, `release`, the informational
//! `locked` query, and scoped acquisition through [`LockGuard`]. The host
//! runtime hands locks out as `Arc<dyn Lock>`, so call sites cannot tell a
//! built-in lock from a pthread-backed one.
//!
//! Usage:
//! ```rust,ignore
//! let lock = Mutex::new();
//! {
//!     let _guard = lock.guard()?;
//!     // critical section
//! }
//! assert!(!lock.locked());
//! ```
//!

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::SyncError;

/// Token value meaning "no thread".
pub const NO_THREAD: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// A process-unique, non-zero identity for the calling thread, used for
/// lock ownership bookkeeping.
pub fn thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

pub trait Lock: Send + Sync + 'static {
    /// With `blocking`, waits until the lock is free and takes it, returning
    /// `true`. Without, makes a single attempt and returns whether it
    /// succeeded.
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError>;

    fn release(&self) -> Result<(), SyncError>;

    /// Whether some thread holds the lock. Racy; informational only.
    fn locked(&self) -> bool;

    /// Whether the calling thread holds the lock.
    ///
    /// The default works for locks that do not track their owner: a lock
    /// that can be taken without blocking is not owned. It cannot tell the
    /// caller apart from another holder. If handing the lock back fails,
    /// the failure is logged and the lock stays taken.
    fn is_owned(&self) -> bool {
        match self.acquire(false) {
            Ok(true) => {
                if let Err(err) = self.release() {
                    tracing::error!(lock = self.type_name(), %err, "release after ownership check failed");
                }
                false
            }
            _ => true,
        }
    }

    /// Releases the lock completely and returns what
    /// [`Lock::acquire_restore`] needs to take it back. Reentrant locks
    /// return their depth.
    fn release_save(&self) -> Result<usize, SyncError> {
        self.release()?;
        Ok(1)
    }

    fn acquire_restore(&self, saved: usize) -> Result<(), SyncError> {
        let _ = saved;
        self.acquire(true).map(drop)
    }

    /// Concrete type name, for diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Blocking acquisition released when the guard goes out of scope.
    fn guard(&self) -> Result<LockGuard<'_>, SyncError>
    where
        Self: Sized,
    {
        LockGuard::acquire(self)
    }
}

/// Holds a lock until dropped, on every exit path including unwinding.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn Lock,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(lock: &'a dyn Lock) -> Result<Self, SyncError> {
        lock.acquire(true)?;
        Ok(LockGuard { lock })
    }

    /// Releases now, reporting the error `Drop` would only log.
    pub fn release(self) -> Result<(), SyncError> {
        let lock = self.lock;
        std::mem::forget(self);
        lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release() {
            tracing::error!(lock = self.lock.type_name(), %err, "scoped release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    /// Minimal lock that does not track its owner.
    #[derive(Default)]
    struct FlagLock {
        held: StdMutex<bool>,
    }

    impl Lock for FlagLock {
        fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
            assert!(!blocking || !*self.held.lock().unwrap(), "test lock would block");
            let mut held = self.held.lock().unwrap();
            if *held {
                return Ok(false);
            }
            *held = true;
            Ok(true)
        }

        fn release(&self) -> Result<(), SyncError> {
            let mut held = self.held.lock().unwrap();
            if !*held {
                return Err(SyncError::NotOwner { operation: "release" });
            }
            *held = false;
            Ok(())
        }

        fn locked(&self) -> bool {
            *self.held.lock().unwrap()
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    /// Takes fine, never gives back.
    #[derive(Default)]
    struct StuckLock {
        held: AtomicBool,
    }

    impl Lock for StuckLock {
        fn acquire(&self, _blocking: bool) -> Result<bool, SyncError> {
            Ok(!self.held.swap(true, Ordering::Relaxed))
        }

        fn release(&self) -> Result<(), SyncError> {
            Err(SyncError::NotOwner { operation: "release" })
        }

        fn locked(&self) -> bool {
            self.held.load(Ordering::Relaxed)
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_default_is_owned_survives_failed_release() {
        let lock = StuckLock::default();
        assert!(!lock.is_owned());
        // The failed hand-back is logged; the lock really is still taken.
        assert!(lock.locked());
        assert!(lock.is_owned());
    }

    #[test]
    fn test_thread_tokens_are_unique() {
        let here = thread_token();
        assert_ne!(here, NO_THREAD);
        assert_eq!(here, thread_token());

        let there = thread::spawn(thread_token).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = FlagLock::default();
        {
            let _guard = lock.guard().unwrap();
            assert!(lock.locked());
        }
        assert!(!lock.locked());
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn fails_inside(lock: &FlagLock) -> Result<(), &'static str> {
            let _guard = lock.guard().map_err(|_| "acquire")?;
            Err("bail out")
        }

        let lock = FlagLock::default();
        assert!(fails_inside(&lock).is_err());
        assert!(!lock.locked());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let lock = Arc::new(FlagLock::default());
        let inner = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let _guard = inner.guard().unwrap();
            panic!("boom");
        })
        .join();
        assert!(result.is_err());
        assert!(!lock.locked());
    }

    #[test]
    fn test_explicit_guard_release_reports_errors() {
        let lock = FlagLock::default();
        let guard = lock.guard().unwrap();
        lock.release().unwrap();
        assert!(matches!(guard.release(), Err(SyncError::NotOwner { .. })));
    }

    #[test]
    fn test_default_is_owned_and_save_restore() {
        let lock = FlagLock::default();
        assert!(!lock.is_owned());
        assert!(!lock.locked());

        lock.acquire(true).unwrap();
        assert!(lock.is_owned());
        assert_eq!(lock.release_save().unwrap(), 1);
        assert!(!lock.locked());
        lock.acquire_restore(1).unwrap();
        assert!(lock.locked());
        lock.release().unwrap();
    }
}
