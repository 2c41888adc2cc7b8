//!
//! Event
//!
//! Manual-reset event: a flag behind a private [`Condition`]. Once set it
//! stays set, and every `wait` returns immediately, until `clear`.
//! Waiters sleep on the condition variable until `set` broadcasts. They do
//! not wake periodically to poll the flag.
//!
//! The condition sits behind an atomic pointer so `reset_after_fork` can
//! swap in a fresh one through a shared reference. A replaced condition is
//! leaked, never destroyed: in a forked child its mutex may be held by a
//! thread that no longer exists, and destroying a held pthread mutex is
//! undefined.
//!

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::time::Duration;

use crate::condition::Condition;
use crate::errors::SyncError;
use crate::lock::Lock;
use crate::timeout::Deadline;

/// Event operations as the host runtime exposes them.
pub trait Signal: Send + Sync + 'static {
    fn set(&self) -> Result<(), SyncError>;

    fn clear(&self) -> Result<(), SyncError>;

    fn is_set(&self) -> bool;

    /// Blocks until the flag is set or `timeout` elapses; returns the flag.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError>;

    /// Replaces the internal lock state after `fork`, keeping the flag. Only
    /// sound in the child while it is still single-threaded.
    fn reset_after_fork(&self) -> Result<(), SyncError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub struct Event {
    // Always a `Box::into_raw` pointer; freed only in `Drop`.
    cond: AtomicPtr<Condition>,
    // Written only with `cond` held; read freely by `is_set`.
    flag: AtomicBool,
}

impl Event {
    /// # Panics
    ///
    /// If the OS cannot initialise the internal mutex or condition variable.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(event) => event,
            Err(err) => panic!("Failed to create event: {err}"),
        }
    }

    pub fn try_new() -> Result<Self, SyncError> {
        Ok(Event {
            cond: AtomicPtr::new(Box::into_raw(Box::new(Condition::try_new()?))),
            flag: AtomicBool::new(false),
        })
    }

    fn cond(&self) -> &Condition {
        // Never null, and no condition it ever pointed to is freed before
        // `self` is dropped.
        unsafe { &*self.cond.load(Ordering::Acquire) }
    }

    /// Sets the flag and wakes every waiter.
    pub fn set(&self) -> Result<(), SyncError> {
        let cond = self.cond();
        let _guard = cond.guard()?;
        self.flag.store(true, Ordering::Release);
        cond.notify_all()
    }

    pub fn clear(&self) -> Result<(), SyncError> {
        let _guard = self.cond().guard()?;
        self.flag.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns at once if the flag is set. Otherwise blocks until `set` or
    /// until `timeout` elapses, and returns the flag as it stands then. A
    /// zero timeout never suspends.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        // Taken before the lock so contention for it counts against the timeout.
        let deadline = Deadline::from_timeout(timeout);

        let cond = self.cond();
        let _guard = cond.guard()?;
        while !self.flag.load(Ordering::Acquire) {
            if !cond.wait_until(deadline)? {
                break;
            }
        }
        Ok(self.flag.load(Ordering::Acquire))
    }

    /// Replaces the internal lock and condition with fresh ones. Meant for
    /// the child side of `fork`, where the old lock may be held by a thread
    /// that no longer exists. The flag is kept. Threads still waiting on the
    /// old condition are not woken by later `set` calls.
    pub fn reset_after_fork(&self) -> Result<(), SyncError> {
        let fresh = Box::into_raw(Box::new(Condition::try_new()?));
        // The old condition is leaked; see the module docs.
        let _ = self.cond.swap(fresh, Ordering::AcqRel);
        Ok(())
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(*self.cond.get_mut())) };
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("set", &self.is_set()).finish()
    }
}

impl Signal for Event {
    fn set(&self) -> Result<(), SyncError> {
        Event::set(self)
    }

    fn clear(&self) -> Result<(), SyncError> {
        Event::clear(self)
    }

    fn is_set(&self) -> bool {
        Event::is_set(self)
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        Event::wait(self, timeout)
    }

    fn reset_after_fork(&self) -> Result<(), SyncError> {
        Event::reset_after_fork(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
