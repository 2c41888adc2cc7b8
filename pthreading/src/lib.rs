///
/// # pthreading - POSIX-backed threading primitives
///
/// Lock, RLock, Condition and Event with the API of a classic threading
/// library, backed directly by pthread mutexes and condition variables, plus
/// an installer that substitutes them for a host runtime's built-in ones.
///
/// ## Library Usage
///
/// ```rust,ignore
/// use pthreading::{Condition, Mutex};
///
/// let cond = Condition::with_lock(Mutex::new());
/// let _guard = cond.guard()?;
/// while !ready() {
///     cond.wait(Some(Duration::from_secs(1)))?;
/// }
/// ```
///
/// ## Substituting the host's primitives
///
/// ```rust,ignore
/// fn main() -> Result<(), pthreading::InstallError> {
///     pthreading::install()?;
///     // From here on, pthreading_host::runtime() hands out pthread-backed
///     // locks, conditions and events.
///     Ok(())
/// }
/// ```
///
/// `install()` must run before anything loads either host layer; see
/// `install` for the precondition.
///

pub mod install;

pub use install::{
    InstallError, Installer, install, is_installed, native_thread_layer, native_threading_layer,
};
pub use pthreading_sync::{
    Condition, Deadline, Event, Lock, LockGuard, Monitor, MonitorLock, Mutex, RecursiveMutex,
    Signal, SyncError,
};
