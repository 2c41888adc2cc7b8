///
/// # Built-in Primitives
///
/// The host runtime's own Lock, RLock, Condition and Event, the ones
/// `pthreading::install()` replaces.
///
/// - `BuiltinLock` is a flag behind a std mutex and condvar. It does not
///   record its holder, so any thread may release it.
/// - `BuiltinRLock` layers an owner and a count over a `BuiltinLock`.
/// - `BuiltinCondition` parks each waiter on a private `BuiltinLock` that a
///   notifier releases. Untimed waits block. Timed waits poll that lock,
///   sleeping between attempts with a doubling delay capped by
///   `PollConfig::max_delay`, so a timed waiter can notice a notification up
///   to one capped delay late.
/// - `BuiltinEvent` is a flag over a `BuiltinCondition` and inherits its
///   polling.
///

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pthreading_sync::lock::NO_THREAD;
use pthreading_sync::{Deadline, Lock, Monitor, Signal, SyncError, thread_token};

use crate::config::PollConfig;

#[derive(Default)]
pub struct BuiltinLock {
    held: Mutex<bool>,
    freed: Condvar,
}

impl BuiltinLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Lock for BuiltinLock {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        let mut held = self.state();
        if *held && !blocking {
            return Ok(false);
        }
        while *held {
            held = self.freed.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        Ok(true)
    }

    fn release(&self) -> Result<(), SyncError> {
        let mut held = self.state();
        if !*held {
            return Err(SyncError::NotOwner { operation: "release" });
        }
        *held = false;
        drop(held);
        self.freed.notify_one();
        Ok(())
    }

    fn locked(&self) -> bool {
        *self.state()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Default)]
pub struct BuiltinRLock {
    block: BuiltinLock,
    owner: AtomicU64,
    count: AtomicUsize,
}

impl BuiltinRLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lock for BuiltinRLock {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        let me = thread_token();
        if self.owner.load(Ordering::Relaxed) == me {
            self.count.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }
        if !self.block.acquire(blocking)? {
            return Ok(false);
        }
        self.owner.store(me, Ordering::Relaxed);
        self.count.store(1, Ordering::Relaxed);
        Ok(true)
    }

    fn release(&self) -> Result<(), SyncError> {
        if !self.is_owned() {
            return Err(SyncError::NotOwner { operation: "release" });
        }
        if self.count.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(NO_THREAD, Ordering::Relaxed);
            self.block.release()?;
        }
        Ok(())
    }

    fn locked(&self) -> bool {
        self.block.locked()
    }

    fn is_owned(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == thread_token()
    }

    fn release_save(&self) -> Result<usize, SyncError> {
        if !self.is_owned() {
            return Err(SyncError::NotOwner { operation: "release" });
        }
        let count = self.count.swap(0, Ordering::Relaxed);
        self.owner.store(NO_THREAD, Ordering::Relaxed);
        self.block.release()?;
        Ok(count)
    }

    fn acquire_restore(&self, saved: usize) -> Result<(), SyncError> {
        self.block.acquire(true)?;
        self.owner.store(thread_token(), Ordering::Relaxed);
        self.count.store(saved.max(1), Ordering::Relaxed);
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub struct BuiltinCondition {
    lock: Arc<dyn Lock>,
    waiters: Mutex<VecDeque<Arc<BuiltinLock>>>,
    poll: PollConfig,
}

impl BuiltinCondition {
    pub fn new(lock: Arc<dyn Lock>, poll: PollConfig) -> Self {
        Self {
            lock,
            waiters: Mutex::new(VecDeque::new()),
            poll,
        }
    }

    fn waiters(&self) -> MutexGuard<'_, VecDeque<Arc<BuiltinLock>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn block_on(&self, waiter: &BuiltinLock, timeout: Option<Duration>) -> Result<bool, SyncError> {
        let Some(timeout) = timeout else {
            return waiter.acquire(true);
        };

        let deadline = Deadline::after(timeout);
        let mut delay = self.poll.initial_delay();
        loop {
            if waiter.acquire(false)? {
                return Ok(true);
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                return Ok(false);
            }
            delay = (delay * 2).min(remaining).min(self.poll.max_delay());
            thread::sleep(delay);
        }
    }

    /// Drops a waiter that gave up; a notifier may already have taken it.
    fn forget(&self, waiter: &Arc<BuiltinLock>) {
        self.waiters().retain(|w| !Arc::ptr_eq(w, waiter));
    }

    /// Forgets every waiter and frees the lock, whoever holds it. Only for a
    /// lock this condition owns, since built-in locks may be released by any
    /// thread.
    fn reset(&self) -> Result<(), SyncError> {
        self.waiters().clear();
        if self.lock.locked() {
            self.lock.release()?;
        }
        Ok(())
    }
}

impl Lock for BuiltinCondition {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        self.lock.acquire(blocking)
    }

    fn release(&self) -> Result<(), SyncError> {
        self.lock.release()
    }

    fn locked(&self) -> bool {
        self.lock.locked()
    }

    fn is_owned(&self) -> bool {
        self.lock.is_owned()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Monitor for BuiltinCondition {
    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        if !self.lock.is_owned() {
            return Err(SyncError::NotOwner { operation: "wait" });
        }

        let waiter = Arc::new(BuiltinLock::new());
        waiter.acquire(true)?;
        self.waiters().push_back(Arc::clone(&waiter));

        let saved = self.lock.release_save()?;
        let woken = self.block_on(&waiter, timeout);
        if !matches!(woken, Ok(true)) {
            self.forget(&waiter);
        }
        self.lock.acquire_restore(saved)?;
        woken
    }

    fn notify(&self) -> Result<(), SyncError> {
        if !self.lock.is_owned() {
            return Err(SyncError::NotOwner { operation: "notify" });
        }
        if let Some(waiter) = self.waiters().pop_front() {
            waiter.release()?;
        }
        Ok(())
    }

    fn notify_all(&self) -> Result<(), SyncError> {
        if !self.lock.is_owned() {
            return Err(SyncError::NotOwner { operation: "notify_all" });
        }
        let waiters: Vec<_> = self.waiters().drain(..).collect();
        for waiter in waiters {
            waiter.release()?;
        }
        Ok(())
    }
}

pub struct BuiltinEvent {
    cond: BuiltinCondition,
    flag: AtomicBool,
}

impl BuiltinEvent {
    pub fn new(poll: PollConfig) -> Self {
        Self {
            cond: BuiltinCondition::new(Arc::new(BuiltinLock::new()), poll),
            flag: AtomicBool::new(false),
        }
    }
}

impl Signal for BuiltinEvent {
    fn set(&self) -> Result<(), SyncError> {
        let _guard = self.cond.guard()?;
        self.flag.store(true, Ordering::Release);
        self.cond.notify_all()
    }

    fn clear(&self) -> Result<(), SyncError> {
        let _guard = self.cond.guard()?;
        self.flag.store(false, Ordering::Release);
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        let _guard = self.cond.guard()?;
        if !self.flag.load(Ordering::Acquire) {
            self.cond.wait(timeout)?;
        }
        Ok(self.flag.load(Ordering::Acquire))
    }

    fn reset_after_fork(&self) -> Result<(), SyncError> {
        self.cond.reset()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
