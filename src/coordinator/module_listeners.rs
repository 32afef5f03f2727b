//! Module listener container

use crate::gc::{GcVisitor, Trace};
use crate::value::ScriptValue;
use std::collections::VecDeque;

/// An event raised by a host module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEvent {
    pub module: String,
    pub data: String,
}

/// Listeners registered through `bridge.addModuleListener`, plus the host
/// events waiting for delivery
#[derive(Default)]
pub struct ModuleListenerContainer {
    listeners: Vec<ScriptValue>,
    queued: VecDeque<ModuleEvent>,
}

impl ModuleListenerContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: ScriptValue) {
        self.listeners.push(listener);
    }

    /// Listeners in registration order
    pub fn listeners(&self) -> Vec<ScriptValue> {
        self.listeners.clone()
    }

    pub fn queue_event(&mut self, module: &str, data: &str) {
        self.queued.push_back(ModuleEvent {
            module: module.to_string(),
            data: data.to_string(),
        });
    }

    pub fn take_events(&mut self) -> Vec<ModuleEvent> {
        self.queued.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
        self.queued.clear();
    }
}

impl Trace for ModuleListenerContainer {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        self.listeners.trace(visitor);
    }
}
