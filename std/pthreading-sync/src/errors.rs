///
/// Synchronization error types.
///
/// `NotOwner`, `WouldDeadlock` and `ForeignLock` are usage errors: an
/// operation was invoked outside its precondition. `Os` carries a pthread
/// return code that none of those cover.
///

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot {operation}: lock is not held by the calling thread")]
    NotOwner { operation: &'static str },

    #[error("cannot acquire: non-reentrant lock is already held by the calling thread")]
    WouldDeadlock,

    #[error("condition requires a pthreading lock, got {type_name}")]
    ForeignLock { type_name: &'static str },

    #[error("{operation} failed: {source}")]
    Os {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub(crate) fn os(operation: &'static str, code: libc::c_int) -> Self {
        SyncError::Os {
            operation,
            source: io::Error::from_raw_os_error(code),
        }
    }

    /// True for the usage errors (the operation was called outside its
    /// precondition), false for OS failures.
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            SyncError::NotOwner { .. } | SyncError::WouldDeadlock | SyncError::ForeignLock { .. }
        )
    }
}
