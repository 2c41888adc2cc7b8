//!
//! pthreading-sync - Native Synchronization Primitives
//!
//! Lock, reentrant lock, condition variable and manual-reset event with the
//! semantics of a classic threading API, implemented directly on pthread
//! mutexes and condition variables:
//!
//! - `Mutex` - non-reentrant lock (`acquire`, `release`, `locked`, scoped guard)
//! - `RecursiveMutex` - lock reentrant by its owning thread, tracked by depth
//! - `Condition` - monitor over either lock, with monotonic-clock timeouts
//! - `Event` - manual-reset flag that waiters sleep on
//!
//! Blocked threads sleep in the kernel. Nothing here polls, and the only
//! suspension points are blocking `acquire`, `Condition::wait` and
//! `Event::wait`.
//!
//! ## Traits
//!
//! `Lock`, `Monitor` and `Signal` are the object-safe faces of the
//! primitives. A host runtime hands these out behind `Arc<dyn ...>`, which is
//! what lets its built-in primitives be swapped for these ones.
//!
//! ## Platform Support
//!
//! Unix only. Timeouts use `CLOCK_MONOTONIC` except on Apple targets, which
//! cannot select a condition variable clock.
//!

pub mod condition;
pub mod errors;
pub mod event;
pub mod lock;
pub mod mutex;
pub mod recursive;
pub mod timeout;

mod native;

pub use condition::{Condition, Monitor, MonitorLock};
pub use errors::SyncError;
pub use event::{Event, Signal};
pub use lock::{Lock, LockGuard, thread_token};
pub use mutex::Mutex;
pub use recursive::RecursiveMutex;
pub use timeout::Deadline;
