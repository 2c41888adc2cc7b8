//!
//! Condition
//!
//! Monitor-style condition variable bound to one [`Mutex`] or
//! [`RecursiveMutex`] for its whole life, backed by a `pthread_cond_t`.
//!
//! `wait` hands the lock's native mutex straight to `pthread_cond_wait`, so
//! releasing the lock and joining the wait set are a single step: a notify
//! issued by another thread as soon as the lock is free cannot be missed.
//! Around that call the Rust-side bookkeeping is vacated and reclaimed. A
//! recursive holder gives up every level while it sleeps and gets exactly
//! its previous depth back, whether it was notified or timed out.
//!
//! `wait` can return `true` while the guarded state is still unchanged
//! (another woken thread got there first, or the OS woke it spuriously).
//! Callers own the predicate and must loop:
//!
//! ```rust,ignore
//! let _guard = cond.guard()?;
//! while !ready.load(Ordering::Relaxed) {
//!     cond.wait(None)?;
//! }
//! ```
//!
//! [`Condition::wait_for`] is that loop, spelled once.
//!

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::SyncError;
use crate::lock::Lock;
use crate::mutex::Mutex;
use crate::native::{RawCondvar, RawMutex};
use crate::recursive::RecursiveMutex;
use crate::timeout::Deadline;

/// Condition-variable operations as the host runtime exposes them.
pub trait Monitor: Lock {
    /// Releases the associated lock, blocks until notified or until
    /// `timeout` elapses, and reacquires the lock before returning. `true`
    /// if woken, `false` on timeout.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError>;

    /// Wakes at most one waiter.
    fn notify(&self) -> Result<(), SyncError>;

    fn notify_all(&self) -> Result<(), SyncError>;
}

/// The lock a [`Condition`] is associated with.
#[derive(Clone, Debug)]
pub enum MonitorLock {
    Plain(Arc<Mutex>),
    Recursive(Arc<RecursiveMutex>),
}

impl MonitorLock {
    pub fn as_lock(&self) -> &dyn Lock {
        match self {
            MonitorLock::Plain(mutex) => mutex.as_ref(),
            MonitorLock::Recursive(mutex) => mutex.as_ref(),
        }
    }

    fn raw(&self) -> &RawMutex {
        match self {
            MonitorLock::Plain(mutex) => mutex.raw(),
            MonitorLock::Recursive(mutex) => mutex.raw(),
        }
    }

    fn vacate(&self) -> usize {
        match self {
            MonitorLock::Plain(mutex) => {
                mutex.vacate();
                1
            }
            MonitorLock::Recursive(mutex) => mutex.vacate(),
        }
    }

    fn reclaim(&self, depth: usize) {
        match self {
            MonitorLock::Plain(mutex) => mutex.reclaim(),
            MonitorLock::Recursive(mutex) => mutex.reclaim(depth),
        }
    }
}

impl From<Mutex> for MonitorLock {
    fn from(mutex: Mutex) -> Self {
        MonitorLock::Plain(Arc::new(mutex))
    }
}

impl From<Arc<Mutex>> for MonitorLock {
    fn from(mutex: Arc<Mutex>) -> Self {
        MonitorLock::Plain(mutex)
    }
}

impl From<RecursiveMutex> for MonitorLock {
    fn from(mutex: RecursiveMutex) -> Self {
        MonitorLock::Recursive(Arc::new(mutex))
    }
}

impl From<Arc<RecursiveMutex>> for MonitorLock {
    fn from(mutex: Arc<RecursiveMutex>) -> Self {
        MonitorLock::Recursive(mutex)
    }
}

impl TryFrom<Arc<dyn Lock>> for MonitorLock {
    type Error = SyncError;

    /// Only this crate's own locks carry a native mutex a condition can wait
    /// on.
    fn try_from(lock: Arc<dyn Lock>) -> Result<Self, SyncError> {
        let type_name = lock.type_name();
        let lock = match lock.into_any().downcast::<Mutex>() {
            Ok(mutex) => return Ok(MonitorLock::Plain(mutex)),
            Err(other) => other,
        };
        match lock.downcast::<RecursiveMutex>() {
            Ok(mutex) => Ok(MonitorLock::Recursive(mutex)),
            Err(_) => Err(SyncError::ForeignLock { type_name }),
        }
    }
}

pub struct Condition {
    lock: MonitorLock,
    cond: RawCondvar,
}

impl Condition {
    /// Condition over a private new [`Mutex`].
    ///
    /// # Panics
    ///
    /// If the OS cannot initialise the mutex or condition variable.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(cond) => cond,
            Err(err) => panic!("Failed to create condition: {err}"),
        }
    }

    pub fn try_new() -> Result<Self, SyncError> {
        Self::try_with_lock(Mutex::try_new()?)
    }

    /// # Panics
    ///
    /// If the OS cannot initialise the condition variable.
    pub fn with_lock(lock: impl Into<MonitorLock>) -> Self {
        match Self::try_with_lock(lock) {
            Ok(cond) => cond,
            Err(err) => panic!("Failed to create condition: {err}"),
        }
    }

    pub fn try_with_lock(lock: impl Into<MonitorLock>) -> Result<Self, SyncError> {
        Ok(Condition {
            lock: lock.into(),
            cond: RawCondvar::new()?,
        })
    }

    pub fn lock(&self) -> &MonitorLock {
        &self.lock
    }

    pub fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        self.lock.as_lock().acquire(blocking)
    }

    pub fn release(&self) -> Result<(), SyncError> {
        self.lock.as_lock().release()
    }

    pub fn is_owned(&self) -> bool {
        self.lock.as_lock().is_owned()
    }

    /// Waits for a notification, or until `timeout` elapses. A zero timeout
    /// checks ownership and returns `false` without suspending.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        self.wait_until(Deadline::from_timeout(timeout))
    }

    /// Waits for a notification or until `deadline`. `false` means the
    /// deadline passed; the lock is held again either way.
    pub fn wait_until(&self, deadline: Deadline) -> Result<bool, SyncError> {
        if !self.lock.as_lock().is_owned() {
            return Err(SyncError::NotOwner { operation: "wait" });
        }
        if deadline.has_expired() {
            return Ok(false);
        }

        let depth = self.lock.vacate();
        let woken = self.cond.wait_until(self.lock.raw(), &deadline);
        self.lock.reclaim(depth);
        woken
    }

    /// Waits until `predicate` holds or `timeout` elapses, re-checking after
    /// every wakeup. Returns the last value of `predicate`.
    pub fn wait_for<P>(&self, mut predicate: P, timeout: Option<Duration>) -> Result<bool, SyncError>
    where
        P: FnMut() -> bool,
    {
        if !self.lock.as_lock().is_owned() {
            return Err(SyncError::NotOwner { operation: "wait" });
        }

        let deadline = Deadline::from_timeout(timeout);
        loop {
            let satisfied = predicate();
            if satisfied || deadline.has_expired() {
                return Ok(satisfied);
            }
            self.wait_until(deadline)?;
        }
    }

    pub fn notify(&self) -> Result<(), SyncError> {
        if !self.lock.as_lock().is_owned() {
            return Err(SyncError::NotOwner { operation: "notify" });
        }
        self.cond.signal()
    }

    pub fn notify_all(&self) -> Result<(), SyncError> {
        if !self.lock.as_lock().is_owned() {
            return Err(SyncError::NotOwner { operation: "notify_all" });
        }
        self.cond.broadcast()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition").field("lock", &self.lock).finish()
    }
}

impl Lock for Condition {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        Condition::acquire(self, blocking)
    }

    fn release(&self) -> Result<(), SyncError> {
        Condition::release(self)
    }

    fn locked(&self) -> bool {
        self.lock.as_lock().locked()
    }

    fn is_owned(&self) -> bool {
        Condition::is_owned(self)
    }

    fn release_save(&self) -> Result<usize, SyncError> {
        self.lock.as_lock().release_save()
    }

    fn acquire_restore(&self, saved: usize) -> Result<(), SyncError> {
        self.lock.as_lock().acquire_restore(saved)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Monitor for Condition {
    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        Condition::wait(self, timeout)
    }

    fn notify(&self) -> Result<(), SyncError> {
        Condition::notify(self)
    }

    fn notify_all(&self) -> Result<(), SyncError> {
        Condition::notify_all(self)
    }
}
