//! Process-wide registry
//!
//! Holds the state shared by every context in the process: the set of live
//! context ids and the plugin bytecode evaluated when a context starts.
//! `init` and `teardown` bracket its lifetime; allocating a context id
//! initializes it implicitly.

use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Registry {
    initialized: bool,
    next_context_id: i32,
    live_contexts: BTreeSet<i32>,
    /// Plugin name → compiled blob, in registration order
    plugins: Vec<(String, Vec<u8>)>,
}

impl Registry {
    fn ensure_init(&mut self) {
        if !self.initialized {
            self.initialized = true;
            self.next_context_id = self.next_context_id.max(1);
        }
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
}

fn registry() -> MutexGuard<'static, Registry> {
    // A panic while holding the lock leaves the data consistent
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize process-wide state. Calling it again is a no-op.
pub fn init() {
    let mut registry = registry();
    if !registry.initialized {
        registry.ensure_init();
        log::debug!("registry initialized");
    }
}

/// Forget every live context id and plugin. Contexts still alive keep
/// working but are no longer reported as valid.
pub fn teardown() {
    let mut registry = registry();
    let live = registry.live_contexts.len();
    registry.live_contexts.clear();
    registry.plugins.clear();
    registry.initialized = false;
    log::debug!("registry torn down ({} live context(s) dropped)", live);
}

pub fn is_initialized() -> bool {
    registry().initialized
}

/// Whether `context_id` names a context that has not been disposed
pub fn is_context_valid(context_id: i32) -> bool {
    registry().live_contexts.contains(&context_id)
}

/// Number of contexts not yet disposed
pub fn live_context_count() -> usize {
    registry().live_contexts.len()
}

/// Register a compiled blob evaluated by every context created afterwards.
/// A blob registered under an existing name replaces it.
pub fn register_plugin_bytecode(name: &str, bytecode: Vec<u8>) {
    let mut registry = registry();
    registry.ensure_init();
    match registry.plugins.iter_mut().find(|(n, _)| n == name) {
        Some(entry) => entry.1 = bytecode,
        None => registry.plugins.push((name.to_string(), bytecode)),
    }
}

/// Remove a plugin. Returns false if none was registered under `name`.
pub fn unregister_plugin_bytecode(name: &str) -> bool {
    let mut registry = registry();
    let before = registry.plugins.len();
    registry.plugins.retain(|(n, _)| n != name);
    registry.plugins.len() != before
}

/// Registered plugins, in registration order
pub fn plugin_bytecodes() -> Vec<(String, Vec<u8>)> {
    registry().plugins.clone()
}

pub(crate) fn allocate_context_id() -> i32 {
    let mut registry = registry();
    registry.ensure_init();
    let id = registry.next_context_id;
    registry.next_context_id = id.checked_add(1).unwrap_or(1);
    registry.live_contexts.insert(id);
    id
}

pub(crate) fn release_context(context_id: i32) {
    registry().live_contexts.remove(&context_id);
}
