///
/// # Runtime Layers
///
/// The host's concurrency support comes in two coupled layers:
///
/// - `thread` - low level: `allocate_lock`, the raw lock constructor
/// - `threading` - Lock, RLock, Condition and Event, built on `thread`
///
/// Each layer is a table of constructors. When `threading` loads it copies
/// `thread.allocate_lock` into its own `lock` entry, the same way a module
/// binds a name it imported. A later change to one table is therefore not
/// seen by the other. Rebinding only one of them leaves a process handing
/// out two kinds of locks.
///

use std::fmt;
use std::sync::Arc;

use pthreading_sync::{Lock, Monitor, Signal, SyncError};

use crate::builtin::{BuiltinCondition, BuiltinEvent, BuiltinLock, BuiltinRLock};
use crate::config::PollConfig;

pub type LockFactory = Arc<dyn Fn() -> Arc<dyn Lock> + Send + Sync>;

/// Builds a condition over the given lock, or over a default lock of the
/// layer's choosing.
pub type ConditionFactory =
    Arc<dyn Fn(Option<Arc<dyn Lock>>) -> Result<Arc<dyn Monitor>, SyncError> + Send + Sync>;

pub type EventFactory = Arc<dyn Fn() -> Arc<dyn Signal> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Thread,
    Threading,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Thread => write!(f, "thread"),
            Layer::Threading => write!(f, "threading"),
        }
    }
}

#[derive(Clone)]
pub struct ThreadLayer {
    pub allocate_lock: LockFactory,
}

impl ThreadLayer {
    pub fn builtin() -> Self {
        Self {
            allocate_lock: Arc::new(|| Arc::new(BuiltinLock::new()) as Arc<dyn Lock>),
        }
    }
}

impl fmt::Debug for ThreadLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLayer").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ThreadingLayer {
    pub lock: LockFactory,
    pub rlock: LockFactory,
    pub condition: ConditionFactory,
    pub event: EventFactory,
}

impl ThreadingLayer {
    /// The stock `threading` table, bound to whatever `thread` currently
    /// allocates.
    pub fn builtin(thread: &ThreadLayer, poll: PollConfig) -> Self {
        let rlock: LockFactory = Arc::new(|| Arc::new(BuiltinRLock::new()) as Arc<dyn Lock>);

        let default_lock = Arc::clone(&rlock);
        let condition: ConditionFactory = Arc::new(
            move |lock: Option<Arc<dyn Lock>>| -> Result<Arc<dyn Monitor>, SyncError> {
                let lock = lock.unwrap_or_else(|| default_lock());
                Ok(Arc::new(BuiltinCondition::new(lock, poll)))
            },
        );

        Self {
            lock: Arc::clone(&thread.allocate_lock),
            rlock,
            condition,
            event: Arc::new(move || Arc::new(BuiltinEvent::new(poll)) as Arc<dyn Signal>),
        }
    }
}

impl fmt::Debug for ThreadingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadingLayer").finish_non_exhaustive()
    }
}

/// Both tables; `None` means not loaded yet.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub thread: Option<ThreadLayer>,
    pub threading: Option<ThreadingLayer>,
}

impl Layers {
    pub fn is_loaded(&self, layer: Layer) -> bool {
        match layer {
            Layer::Thread => self.thread.is_some(),
            Layer::Threading => self.threading.is_some(),
        }
    }
}
