///
/// # Host Runtime
///
/// `HostRuntime` owns the `thread` and `threading` tables behind one mutex.
/// A layer loads on first use, like a lazily imported module. Constructors
/// look the factory up per call, so a rebinding reaches every later
/// construction but never objects created before it.
///
/// `rebind` runs a closure over both tables inside that mutex. This is the
/// surface an installer writes into, and it lets the installer check and
/// replace the tables with no load slipping in between.
///

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pthreading_sync::{Lock, Monitor, Signal, SyncError};

use crate::config::RuntimeConfig;
use crate::layers::{Layer, Layers, ThreadLayer, ThreadingLayer};

pub struct HostRuntime {
    config: RuntimeConfig,
    layers: Mutex<Layers>,
}

impl HostRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            layers: Mutex::new(Layers::default()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn layers(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self, layer: Layer) -> bool {
        self.layers().is_loaded(layer)
    }

    fn load_thread(layers: &mut Layers) -> &ThreadLayer {
        layers.thread.get_or_insert_with(|| {
            tracing::debug!(layer = %Layer::Thread, "loading built-in layer");
            ThreadLayer::builtin()
        })
    }

    /// The `thread` table, loading it if needed.
    pub fn thread(&self) -> ThreadLayer {
        Self::load_thread(&mut self.layers()).clone()
    }

    /// The `threading` table, loading it (and `thread` first) if needed.
    pub fn threading(&self) -> ThreadingLayer {
        let mut layers = self.layers();
        if let Some(threading) = &layers.threading {
            return threading.clone();
        }

        let thread = Self::load_thread(&mut layers).clone();
        tracing::debug!(layer = %Layer::Threading, "loading built-in layer");
        let threading = ThreadingLayer::builtin(&thread, self.config.poll);
        layers.threading = Some(threading.clone());
        threading
    }

    pub fn allocate_lock(&self) -> Arc<dyn Lock> {
        (self.thread().allocate_lock)()
    }

    pub fn new_lock(&self) -> Arc<dyn Lock> {
        (self.threading().lock)()
    }

    pub fn new_rlock(&self) -> Arc<dyn Lock> {
        (self.threading().rlock)()
    }

    pub fn new_condition(&self, lock: Option<Arc<dyn Lock>>) -> Result<Arc<dyn Monitor>, SyncError> {
        (self.threading().condition)(lock)
    }

    pub fn new_event(&self) -> Arc<dyn Signal> {
        (self.threading().event)()
    }

    /// Runs `f` over both tables in a single critical section.
    pub fn rebind<R>(&self, f: impl FnOnce(&mut Layers) -> R) -> R {
        let mut layers = self.layers();
        tracing::debug!("rebinding host layers");
        f(&mut *layers)
    }

    /// Forgets a loaded layer; the next access loads it afresh. For
    /// embedders tearing the runtime down, and for tests. Returns whether
    /// the layer was loaded.
    pub fn unload(&self, layer: Layer) -> bool {
        let mut layers = self.layers();
        let was_loaded = match layer {
            Layer::Thread => layers.thread.take().is_some(),
            Layer::Threading => layers.threading.take().is_some(),
        };
        if was_loaded {
            tracing::debug!(%layer, "unloaded layer");
        }
        was_loaded
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layers = self.layers();
        f.debug_struct("HostRuntime")
            .field("config", &self.config)
            .field("thread", &layers.thread.is_some())
            .field("threading", &layers.threading.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{BuiltinLock, BuiltinRLock};
    use std::time::Duration;

    #[test]
    fn test_layers_load_lazily() {
        let host = HostRuntime::default();
        assert!(!host.is_loaded(Layer::Thread));
        assert!(!host.is_loaded(Layer::Threading));

        let _ = host.allocate_lock();
        assert!(host.is_loaded(Layer::Thread));
        assert!(!host.is_loaded(Layer::Threading));
    }

    #[test]
    fn test_threading_loads_thread_first() {
        let host = HostRuntime::default();
        let _ = host.new_event();
        assert!(host.is_loaded(Layer::Thread));
        assert!(host.is_loaded(Layer::Threading));
    }

    #[test]
    fn test_builtin_constructors() {
        let host = HostRuntime::default();
        assert!(host.new_lock().into_any().downcast::<BuiltinLock>().is_ok());
        assert!(host.new_rlock().into_any().downcast::<BuiltinRLock>().is_ok());

        let cond = host.new_condition(Some(host.new_lock())).unwrap();
        cond.acquire(true).unwrap();
        assert!(!cond.wait(Some(Duration::ZERO)).unwrap());
        cond.release().unwrap();

        let event = host.new_event();
        event.set().unwrap();
        assert!(event.wait(None).unwrap());
    }

    #[test]
    fn test_unload() {
        let host = HostRuntime::default();
        let _ = host.threading();
        assert!(host.unload(Layer::Thread));
        assert!(!host.unload(Layer::Thread));
        assert!(!host.is_loaded(Layer::Thread));
        assert!(host.is_loaded(Layer::Threading));
    }

    #[test]
    fn test_rebind_reaches_later_constructions() {
        let host = HostRuntime::default();
        let before = host.allocate_lock();

        host.rebind(|layers| {
            layers.thread = Some(ThreadLayer {
                allocate_lock: Arc::new(|| Arc::new(BuiltinRLock::new()) as Arc<dyn Lock>),
            });
        });

        assert!(before.into_any().downcast::<BuiltinLock>().is_ok());
        assert!(host.allocate_lock().into_any().downcast::<BuiltinRLock>().is_ok());
    }

    #[test]
    fn test_threading_keeps_stale_binding() {
        let host = HostRuntime::default();
        let _ = host.threading();

        host.rebind(|layers| {
            layers.thread = Some(ThreadLayer {
                allocate_lock: Arc::new(|| Arc::new(BuiltinRLock::new()) as Arc<dyn Lock>),
            });
        });

        // `threading.lock` still points at the allocator it was loaded with.
        assert!(host.new_lock().into_any().downcast::<BuiltinLock>().is_ok());
    }
}
