//!
//! Native pthread objects
//!
//! Thin owners of a `pthread_mutex_t` and a `pthread_cond_t`. Both are boxed
//! because pthread objects must not move once initialised. Mutexes are of
//! type `PTHREAD_MUTEX_ERRORCHECK`, so the OS itself reports self-deadlock
//! and release by a thread that does not hold the lock.
//!

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crate::errors::SyncError;
use crate::timeout::Deadline;
#[cfg(not(target_vendor = "apple"))]
use crate::timeout::CONDITION_CLOCK;

fn check(operation: &'static str, rc: libc::c_int) -> Result<(), SyncError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SyncError::os(operation, rc))
    }
}

struct MutexAttr<'a>(&'a mut MaybeUninit<libc::pthread_mutexattr_t>);

impl Drop for MutexAttr<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutexattr_destroy(self.0.as_mut_ptr());
        }
    }
}

struct CondAttr<'a>(&'a mut MaybeUninit<libc::pthread_condattr_t>);

impl Drop for CondAttr<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_condattr_destroy(self.0.as_mut_ptr());
        }
    }
}

pub(crate) struct RawMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub(crate) fn new() -> Result<Self, SyncError> {
        let mutex = RawMutex {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)),
        };

        let mut storage = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check("pthread_mutexattr_init", unsafe {
            libc::pthread_mutexattr_init(storage.as_mut_ptr())
        })?;
        let attr = MutexAttr(&mut storage);

        check("pthread_mutexattr_settype", unsafe {
            libc::pthread_mutexattr_settype(attr.0.as_mut_ptr(), libc::PTHREAD_MUTEX_ERRORCHECK)
        })?;
        check("pthread_mutex_init", unsafe {
            libc::pthread_mutex_init(mutex.inner.get(), attr.0.as_ptr())
        })?;

        Ok(mutex)
    }

    pub(crate) fn lock(&self) -> Result<(), SyncError> {
        match unsafe { libc::pthread_mutex_lock(self.inner.get()) } {
            0 => Ok(()),
            libc::EDEADLK => Err(SyncError::WouldDeadlock),
            rc => Err(SyncError::os("pthread_mutex_lock", rc)),
        }
    }

    /// `Ok(false)` if any thread, the caller included, holds the mutex.
    pub(crate) fn try_lock(&self) -> Result<bool, SyncError> {
        match unsafe { libc::pthread_mutex_trylock(self.inner.get()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            rc => Err(SyncError::os("pthread_mutex_trylock", rc)),
        }
    }

    pub(crate) fn unlock(&self) -> Result<(), SyncError> {
        match unsafe { libc::pthread_mutex_unlock(self.inner.get()) } {
            0 => Ok(()),
            libc::EPERM => Err(SyncError::NotOwner { operation: "release" }),
            rc => Err(SyncError::os("pthread_mutex_unlock", rc)),
        }
    }

    fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        // Destroying a held mutex is undefined; one still held (a forgotten
        // guard) is left undestroyed.
        if unsafe { libc::pthread_mutex_trylock(self.inner.get()) } == 0 {
            unsafe {
                libc::pthread_mutex_unlock(self.inner.get());
                libc::pthread_mutex_destroy(self.inner.get());
            }
        }
    }
}

/// A pthread condition variable. Callers must always pair it with the same
/// [`RawMutex`].
pub(crate) struct RawCondvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for RawCondvar {}
unsafe impl Sync for RawCondvar {}

impl RawCondvar {
    pub(crate) fn new() -> Result<Self, SyncError> {
        let cond = RawCondvar {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)),
        };

        let mut storage = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check("pthread_condattr_init", unsafe {
            libc::pthread_condattr_init(storage.as_mut_ptr())
        })?;
        let attr = CondAttr(&mut storage);

        #[cfg(not(target_vendor = "apple"))]
        check("pthread_condattr_setclock", unsafe {
            libc::pthread_condattr_setclock(attr.0.as_mut_ptr(), CONDITION_CLOCK)
        })?;
        check("pthread_cond_init", unsafe {
            libc::pthread_cond_init(cond.inner.get(), attr.0.as_ptr())
        })?;

        Ok(cond)
    }

    /// Atomically unlocks `mutex` and blocks; `mutex` is locked again on
    /// return, whatever the outcome.
    pub(crate) fn wait(&self, mutex: &RawMutex) -> Result<(), SyncError> {
        match unsafe { libc::pthread_cond_wait(self.inner.get(), mutex.as_ptr()) } {
            0 => Ok(()),
            libc::EPERM => Err(SyncError::NotOwner { operation: "wait" }),
            rc => Err(SyncError::os("pthread_cond_wait", rc)),
        }
    }

    /// Like [`RawCondvar::wait`] but gives up at `deadline`. `Ok(false)` on
    /// timeout.
    pub(crate) fn wait_until(&self, mutex: &RawMutex, deadline: &Deadline) -> Result<bool, SyncError> {
        let Some(abstime) = deadline.to_timespec() else {
            return self.wait(mutex).map(|()| true);
        };

        match unsafe { libc::pthread_cond_timedwait(self.inner.get(), mutex.as_ptr(), &abstime) } {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            libc::EPERM => Err(SyncError::NotOwner { operation: "wait" }),
            rc => Err(SyncError::os("pthread_cond_timedwait", rc)),
        }
    }

    pub(crate) fn signal(&self) -> Result<(), SyncError> {
        check("pthread_cond_signal", unsafe {
            libc::pthread_cond_signal(self.inner.get())
        })
    }

    pub(crate) fn broadcast(&self) -> Result<(), SyncError> {
        check("pthread_cond_broadcast", unsafe {
            libc::pthread_cond_broadcast(self.inner.get())
        })
    }
}

impl Drop for RawCondvar {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}
