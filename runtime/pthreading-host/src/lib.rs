///
/// pthreading-host - Host Runtime Concurrency Library
///
/// Models the concurrency library of a hosting runtime as two coupled
/// layers of constructors that can be rebound at run time:
///
/// - `thread` - `allocate_lock`
/// - `threading` - `Lock`, `RLock`, `Condition`, `Event`
///
/// Out of the box both layers hand out the built-in primitives in
/// `builtin`, whose timed waits poll. `pthreading::install()` rebinds the
/// tables so every later construction yields a pthread-backed primitive.
///
/// ## Process-wide runtime
///
/// `runtime()` returns the single `HostRuntime` of the process, configured
/// from `PTHREADING_HOST_CONFIG` on first use. Tests and embedders that need
/// isolation create their own `HostRuntime`.
///

pub mod builtin;
pub mod config;
pub mod layers;
pub mod runtime;

pub use config::{ConfigError, PollConfig, RuntimeConfig};
pub use layers::{ConditionFactory, EventFactory, Layer, Layers, LockFactory, ThreadLayer, ThreadingLayer};
pub use runtime::HostRuntime;

use std::sync::OnceLock;

static RUNTIME: OnceLock<HostRuntime> = OnceLock::new();

pub fn runtime() -> &'static HostRuntime {
    RUNTIME.get_or_init(|| HostRuntime::new(RuntimeConfig::from_env()))
}
