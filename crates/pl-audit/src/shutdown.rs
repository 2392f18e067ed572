//! Process-exit hooks.
//!
//! Components that buffer signed output register a hook so a partial batch is
//! still flushed when the process exits normally. The table holds weak
//! references only; a dropped component is skipped. Each registration is
//! represented by an owned [`HookId`] that can be removed exactly once.
//!
//! On Unix the table is run from an `atexit` handler installed on first use.
//! Hosts that exit by other means can call [`run_shutdown_hooks`] themselves.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{Mutex, Once, PoisonError, Weak};

/// Something to run at process exit.
pub trait ShutdownHook: Send + Sync {
    fn on_shutdown(&self);
}

/// Handle of a registered hook. Not clonable: deregistration consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct HookTable {
    next: u64,
    hooks: BTreeMap<u64, Weak<dyn ShutdownHook>>,
}

static HOOKS: Lazy<Mutex<HookTable>> = Lazy::new(|| Mutex::new(HookTable::default()));
static INSTALL: Once = Once::new();

/// Register `hook` to run at process exit.
pub fn register(hook: Weak<dyn ShutdownHook>) -> HookId {
    install_exit_handler();
    let mut table = HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
    let id = table.next;
    table.next += 1;
    table.hooks.insert(id, hook);
    HookId(id)
}

/// Remove a hook. Returns `false` if it already ran.
pub fn deregister(id: HookId) -> bool {
    let mut table = HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
    table.hooks.remove(&id.0).is_some()
}

/// Run and remove every registered hook, oldest first.
pub fn run_shutdown_hooks() {
    // Hooks may deregister themselves; run them outside the lock.
    let hooks = {
        let mut table = HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut table.hooks)
    };
    for (id, hook) in hooks {
        if let Some(hook) = hook.upgrade() {
            tracing::debug!(hook_id = id, "running shutdown hook");
            hook.on_shutdown();
        }
    }
}

/// Number of registered hooks.
pub fn registered_hooks() -> usize {
    HOOKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .hooks
        .len()
}

#[cfg(unix)]
fn install_exit_handler() {
    extern "C" fn at_exit() {
        // Unwinding out of an atexit handler is undefined behavior.
        let _ = std::panic::catch_unwind(run_shutdown_hooks);
    }

    INSTALL.call_once(|| {
        // SAFETY: `at_exit` is a plain `extern "C"` function with no captured state.
        let rc = unsafe { libc::atexit(at_exit) };
        if rc != 0 {
            tracing::warn!("failed to install process exit handler; call run_shutdown_hooks explicitly");
        }
    });
}

#[cfg(not(unix))]
fn install_exit_handler() {
    INSTALL.call_once(|| {
        tracing::debug!("no process exit handler on this platform; call run_shutdown_hooks explicitly");
    });
}
