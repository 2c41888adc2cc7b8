//!
//! RecursiveMutex
//!
//! Reentrant lock: a [`Mutex`] plus a depth counter. The owning thread may
//! acquire it again any number of times; other threads get it only once the
//! owner has released it as many times as it acquired it.
//!
//! Invariant: `depth > 0` exactly when the inner mutex is owned. Only the
//! owner reads or writes `depth`.
//!

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::SyncError;
use crate::lock::Lock;
use crate::mutex::Mutex;
use crate::native::RawMutex;

pub struct RecursiveMutex {
    mutex: Mutex,
    depth: AtomicUsize,
}

impl RecursiveMutex {
    /// # Panics
    ///
    /// If the OS cannot initialise the underlying mutex.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(mutex) => mutex,
            Err(err) => panic!("Failed to create recursive mutex: {err}"),
        }
    }

    pub fn try_new() -> Result<Self, SyncError> {
        Ok(RecursiveMutex {
            mutex: Mutex::try_new()?,
            depth: AtomicUsize::new(0),
        })
    }

    /// The owner always succeeds immediately, blocking or not.
    pub fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        if self.mutex.is_owned() {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }

        if !self.mutex.acquire(blocking)? {
            return Ok(false);
        }
        self.depth.store(1, Ordering::Relaxed);
        Ok(true)
    }

    pub fn release(&self) -> Result<(), SyncError> {
        if !self.mutex.is_owned() {
            return Err(SyncError::NotOwner { operation: "release" });
        }

        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.mutex.release()?;
        }
        Ok(())
    }

    pub fn locked(&self) -> bool {
        self.mutex.locked()
    }

    pub fn is_owned(&self) -> bool {
        self.mutex.is_owned()
    }

    /// Current reentrancy depth as seen by the owner; zero for anyone else.
    pub fn depth(&self) -> usize {
        if self.mutex.is_owned() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Releases every level at once and returns the depth to restore.
    pub fn release_all(&self) -> Result<usize, SyncError> {
        if !self.mutex.is_owned() {
            return Err(SyncError::NotOwner { operation: "release" });
        }
        let depth = self.depth.swap(0, Ordering::Relaxed);
        self.mutex.release()?;
        Ok(depth)
    }

    /// Blocks until the lock is free, then takes it at `depth` levels.
    pub fn acquire_at_depth(&self, depth: usize) -> Result<(), SyncError> {
        self.mutex.acquire(true)?;
        self.depth.store(depth.max(1), Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn raw(&self) -> &RawMutex {
        self.mutex.raw()
    }

    /// Drops ownership and depth while the native mutex stays locked, ahead
    /// of a condition wait. Returns the depth for [`RecursiveMutex::reclaim`].
    pub(crate) fn vacate(&self) -> usize {
        let depth = self.depth.swap(0, Ordering::Relaxed);
        self.mutex.vacate();
        depth
    }

    pub(crate) fn reclaim(&self, depth: usize) {
        self.mutex.reclaim();
        self.depth.store(depth, Ordering::Relaxed);
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("locked", &self.locked())
            .field("owned", &self.is_owned())
            .finish()
    }
}

impl Lock for RecursiveMutex {
    fn acquire(&self, blocking: bool) -> Result<bool, SyncError> {
        RecursiveMutex::acquire(self, blocking)
    }

    fn release(&self) -> Result<(), SyncError> {
        RecursiveMutex::release(self)
    }

    fn locked(&self) -> bool {
        RecursiveMutex::locked(self)
    }

    fn is_owned(&self) -> bool {
        RecursiveMutex::is_owned(self)
    }

    fn release_save(&self) -> Result<usize, SyncError> {
        self.release_all()
    }

    fn acquire_restore(&self, saved: usize) -> Result<(), SyncError> {
        self.acquire_at_depth(saved)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
