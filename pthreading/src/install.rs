///
/// # Installer
///
/// Swaps the host runtime's built-in primitives for the pthread-backed ones
/// by rewriting both constructor tables of a `HostRuntime`.
///
/// ## Consistency precondition
///
/// The `thread` and `threading` layers must be either both loaded or both
/// unloaded. If only one is loaded, something already used the runtime
/// partway, and references bound at that time would keep producing built-in
/// locks next to the new ones. Mixing the two kinds (e.g. a built-in lock
/// handed to a native condition) is refused with
/// `InstallError::Precondition` and nothing is changed.
///
/// ## Idempotence
///
/// The first successful call records `installed`; later calls return `Ok`
/// without touching the runtime. The check, both rebinds and the flag update
/// are serialised, so concurrent first callers install exactly once.
///

use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use pthreading_host::{
    ConditionFactory, EventFactory, HostRuntime, Layer, Layers, LockFactory, ThreadLayer,
    ThreadingLayer,
};
use pthreading_sync::{
    Condition, Event, Lock, Monitor, MonitorLock, Mutex as NativeMutex, RecursiveMutex, Signal,
    SyncError,
};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(
        "cannot install: the {loaded} layer is loaded but the {missing} layer is not; \
         install before either is used"
    )]
    Precondition { loaded: Layer, missing: Layer },
}

/// `thread` table allocating [`NativeMutex`]es.
pub fn native_thread_layer() -> ThreadLayer {
    ThreadLayer {
        allocate_lock: Arc::new(|| Arc::new(NativeMutex::new()) as Arc<dyn Lock>),
    }
}

/// `threading` table of pthread-backed primitives, with `lock` bound to
/// `thread.allocate_lock`.
pub fn native_threading_layer(thread: &ThreadLayer) -> ThreadingLayer {
    let rlock: LockFactory = Arc::new(|| Arc::new(RecursiveMutex::new()) as Arc<dyn Lock>);

    let condition: ConditionFactory = Arc::new(
        |lock: Option<Arc<dyn Lock>>| -> Result<Arc<dyn Monitor>, SyncError> {
            let cond = match lock {
                None => Condition::try_new()?,
                Some(lock) => Condition::try_with_lock(MonitorLock::try_from(lock)?)?,
            };
            Ok(Arc::new(cond))
        },
    );

    let event: EventFactory = Arc::new(|| Arc::new(Event::new()) as Arc<dyn Signal>);

    ThreadingLayer {
        lock: Arc::clone(&thread.allocate_lock),
        rlock,
        condition,
        event,
    }
}

/// `Ok(true)` when both layers are loaded, `Ok(false)` when neither is.
fn check_consistent(layers: &Layers) -> Result<bool, InstallError> {
    match (layers.is_loaded(Layer::Thread), layers.is_loaded(Layer::Threading)) {
        (true, false) => Err(InstallError::Precondition {
            loaded: Layer::Thread,
            missing: Layer::Threading,
        }),
        (false, true) => Err(InstallError::Precondition {
            loaded: Layer::Threading,
            missing: Layer::Thread,
        }),
        (both, _) => Ok(both),
    }
}

pub struct Installer {
    installed: Mutex<bool>,
}

impl Installer {
    pub const fn new() -> Self {
        Self {
            installed: Mutex::new(false),
        }
    }

    pub fn is_installed(&self) -> bool {
        *self.installed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn install_into(&self, host: &HostRuntime) -> Result<(), InstallError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if *installed {
            tracing::debug!("pthreading already installed");
            return Ok(());
        }

        let rebound = host.rebind(|layers| {
            let were_loaded = check_consistent(layers)?;
            let thread = native_thread_layer();
            layers.threading = Some(native_threading_layer(&thread));
            layers.thread = Some(thread);
            Ok::<_, InstallError>(were_loaded)
        });

        match rebound {
            Ok(were_loaded) => {
                tracing::info!(were_loaded, "installed pthread-backed primitives");
                *installed = true;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "refusing to install");
                Err(err)
            }
        }
    }
}

impl Default for Installer {
    fn default() -> Self {
        Self::new()
    }
}

static INSTALLER: Installer = Installer::new();

/// Installs the pthread-backed primitives into the process-wide host
/// runtime. Call it once, early, before anything asks the runtime for a
/// lock.
pub fn install() -> Result<(), InstallError> {
    INSTALLER.install_into(pthreading_host::runtime())
}

pub fn is_installed() -> bool {
    INSTALLER.is_installed()
}
