//!
//! Mutex
//!
//! Non-reentrant exclusive lock on top of an error-checking
//! `pthread_mutex_t`. Waiters block in the kernel instead of polling, so
//! contended acquisition costs no CPU and the OS scheduler decides who goes
//! next.
//!
//! The holder's [`thread_token`] is recorded next to the native mutex. That
//! is what lets `release`, and the condition variable operations that
//! require the lock, refuse callers that do not hold it, and it is what
//! `locked` reports.
//!

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::SyncError;
use crate::lock::{Lock, NO_THREAD, thread_token};
use crate::native::RawMutex;

pub struct Mutex {
    raw: RawMutex,
    owner: AtomicU64,
}

impl Mutex {
    /// Creates an unlocked mutex.
    ///
    /// # Panics
    ///
    /// If the OS cannot initialise the mutex (resource exhaustion). Use
    /// [`Mutex::try_new`] to handle that instead.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(mutex) => mutex,
            Err(err) => panic!("Failed to create mutex: {err}"),
        }
    }

    pub fn try_new() -> Result<Self, SyncError> {
        Ok(Mutex {
            raw: RawMutex::new()?,
            owner: AtomicU64::new(NO_THREAD),
        })
    }

    pub fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        if blocking {
            if self.is_owned() {
                return Err(SyncError::WouldDeadlock);
            }
            self.raw.lock()?;
        } else if !self.raw.try_lock()? {
            return Ok(false);
        }

        self.owner.store(thread_token(), Ordering::Relaxed);
        Ok(true)
    }

    pub fn release(&self) -> Result<(), SyncError> {
        if !self.is_owned() {
            return Err(SyncError::NotOwner { operation: "release" });
        }
        self.owner.store(NO_THREAD, Ordering::Relaxed);
        self.raw.unlock()
    }

    /// Answers from the recorded holder and never touches the native mutex,
    /// so asking cannot make another thread's `acquire(false)` fail. A thread
    /// parked in a condition wait has vacated the lock and does not count.
    pub fn locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != NO_THREAD
    }

    /// Only the owner ever stores its own token, so a relaxed load can match
    /// the caller's token only when the caller holds the lock.
    pub fn is_owned(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == thread_token()
    }

    pub(crate) fn raw(&self) -> &RawMutex {
        &self.raw
    }

    /// Clears ownership while the native mutex stays locked, ahead of a
    /// condition wait that unlocks it atomically.
    pub(crate) fn vacate(&self) {
        self.owner.store(NO_THREAD, Ordering::Relaxed);
    }

    /// Reclaims ownership after the condition wait relocked the native mutex.
    pub(crate) fn reclaim(&self) {
        self.owner.store(thread_token(), Ordering::Relaxed);
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex").field("locked", &self.locked()).finish()
    }
}

impl Lock for Mutex {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        Mutex::acquire(self, blocking)
    }

    fn release(&self) -> Result<(), SyncError> {
        Mutex::release(self)
    }

    fn locked(&self) -> bool {
        Mutex::locked(self)
    }

    fn is_owned(&self) -> bool {
        Mutex::is_owned(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let lock = Mutex::new();
        assert!(!lock.locked());
        assert!(lock.acquire(true).unwrap());
        assert!(lock.locked());
        assert!(lock.is_owned());
        lock.release().unwrap();
        assert!(!lock.locked());
        assert!(lock.acquire(false).unwrap());
        lock.release().unwrap();
    }

    #[test]
    fn test_acquire_nonblocking_when_held() {
        let lock = Mutex::new();
        lock.acquire(true).unwrap();
        assert!(!lock.acquire(false).unwrap());
        lock.release().unwrap();
    }

    #[test]
    fn test_blocking_reacquire_is_refused() {
        let lock = Mutex::new();
        lock.acquire(true).unwrap();
        let err = lock.acquire(true).unwrap_err();
        assert!(matches!(err, SyncError::WouldDeadlock));
        assert!(err.is_illegal_state());
        lock.release().unwrap();
    }

    #[test]
    fn test_release_unheld() {
        let lock = Mutex::new();
        let err = lock.release().unwrap_err();
        assert!(matches!(err, SyncError::NotOwner { operation: "release" }));
    }

    #[test]
    fn test_other_thread_sees_held_lock() {
        let lock = Arc::new(Mutex::new());
        lock.acquire(true).unwrap();

        let probe = Arc::clone(&lock);
        let (got_it, released) = thread::spawn(move || {
            let got_it = probe.acquire(false).unwrap();
            let released = probe.release();
            (got_it, released)
        })
        .join()
        .unwrap();
        assert!(!got_it);
        assert!(matches!(released, Err(SyncError::NotOwner { .. })));

        lock.release().unwrap();
        let probe = Arc::clone(&lock);
        let got_it = thread::spawn(move || {
            let got_it = probe.acquire(false).unwrap();
            probe.release().unwrap();
            got_it
        })
        .join()
        .unwrap();
        assert!(got_it);
    }

    #[test]
    fn test_blocking_acquire_waits_for_holder() {
        let lock = Arc::new(Mutex::new());
        lock.acquire(true).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.acquire(true).unwrap();
                tx.send(()).unwrap();
                lock.release().unwrap();
            })
        };

        assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
        lock.release().unwrap();
        rx.recv().unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_locked_query_does_not_disturb_try_acquire() {
        let lock = Arc::new(Mutex::new());
        let stop = Arc::new(AtomicBool::new(false));

        let watcher = {
            let lock = Arc::clone(&lock);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let _ = lock.locked();
                }
            })
        };

        let mut failures = 0;
        for _ in 0..50_000 {
            if lock.acquire(false).unwrap() {
                assert!(lock.locked());
                lock.release().unwrap();
            } else {
                failures += 1;
            }
        }
        stop.store(true, Ordering::Relaxed);
        watcher.join().unwrap();

        assert_eq!(failures, 0);
        assert!(!lock.locked());
    }

    #[test]
    fn test_guard_counts_under_contention() {
        let lock = Arc::new(Mutex::new());
        let counter = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let _guard = lock.guard().unwrap();
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
        assert!(!lock.locked());
    }
}
