//!
//! Timeouts and Clocks
//!
//! Every timed wait in this crate is expressed as a [`Deadline`]: an absolute
//! point on the monotonic clock (`Instant`), or never. Deadlines are taken
//! before any lock is acquired, so time spent contending for the lock counts
//! against the caller's timeout.
//!
//! `pthread_cond_timedwait` wants an absolute `timespec` on the condition's
//! clock. Condition variables are created with `CLOCK_MONOTONIC` wherever
//! `pthread_condattr_setclock` exists; Apple targets lack it, so there the
//! `timespec` is derived from the realtime clock on every wait slice while the
//! deadline itself stays monotonic.
//!

use std::mem;
use std::time::{Duration, Instant};

#[cfg(not(target_vendor = "apple"))]
pub(crate) const CONDITION_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;

#[cfg(target_vendor = "apple")]
pub(crate) const CONDITION_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// An absolute wake deadline on the monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub const NEVER: Deadline = Deadline { at: None };

    /// Deadline `timeout` from now. A timeout too large to represent never
    /// expires.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// `None` means wait forever.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::NEVER, Self::after)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline { at: Some(instant) }
    }

    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    pub fn is_never(&self) -> bool {
        self.at.is_none()
    }

    /// Time left before expiry, zero once expired, `None` for [`Deadline::NEVER`].
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn has_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Absolute `timespec` on [`CONDITION_CLOCK`] for `pthread_cond_timedwait`.
    pub(crate) fn to_timespec(&self) -> Option<libc::timespec> {
        let remaining = self.remaining()?;
        Some(timespec_after(clock_now(CONDITION_CLOCK), remaining))
    }
}

fn clock_now(clock: libc::clockid_t) -> libc::timespec {
    let mut now: libc::timespec = unsafe { mem::zeroed() };
    // Only fails for an unsupported clock id.
    let rc = unsafe { libc::clock_gettime(clock, &mut now) };
    debug_assert_eq!(rc, 0, "clock_gettime({clock}) failed");
    now
}

/// `base + offset`, saturating at the largest representable `timespec`.
fn timespec_after(base: libc::timespec, offset: Duration) -> libc::timespec {
    let mut nsec = base.tv_nsec as i64 + i64::from(offset.subsec_nanos());
    let mut carry: libc::time_t = 0;
    if nsec >= NANOS_PER_SEC {
        nsec -= NANOS_PER_SEC;
        carry = 1;
    }

    let sec = libc::time_t::try_from(offset.as_secs())
        .ok()
        .and_then(|secs| base.tv_sec.checked_add(secs))
        .and_then(|sec| sec.checked_add(carry));

    let mut out: libc::timespec = unsafe { mem::zeroed() };
    match sec {
        Some(sec) => {
            out.tv_sec = sec;
            out.tv_nsec = nsec as _;
        }
        None => {
            out.tv_sec = libc::time_t::MAX;
            out.tv_nsec = (NANOS_PER_SEC - 1) as _;
        }
    }
    out
}
