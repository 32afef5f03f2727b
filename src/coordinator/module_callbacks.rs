//! Module callback coordinator
//!
//! Holds the callbacks passed to `bridge.invokeModule` until the host
//! completes them. Completed callbacks run on the next tick, in completion
//! order.

use crate::gc::{GcVisitor, Trace};
use crate::value::ScriptValue;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleCallbackId(pub u32);

/// Outcome reported by the host: data on success, an error message otherwise
pub type ModuleResult = Result<String, String>;

#[derive(Debug, Clone)]
pub struct CompletedModuleCallback {
    pub id: ModuleCallbackId,
    pub callback: ScriptValue,
    pub result: ModuleResult,
}

#[derive(Default)]
pub struct ModuleCallbackCoordinator {
    pending: BTreeMap<ModuleCallbackId, ScriptValue>,
    completed: VecDeque<CompletedModuleCallback>,
    next_id: u32,
}

impl ModuleCallbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: ScriptValue) -> ModuleCallbackId {
        self.next_id += 1;
        let id = ModuleCallbackId(self.next_id);
        self.pending.insert(id, callback);
        id
    }

    /// Mark a callback complete. Returns false for unknown or already
    /// completed ids.
    pub fn complete(&mut self, id: ModuleCallbackId, result: ModuleResult) -> bool {
        let Some(callback) = self.pending.remove(&id) else {
            return false;
        };
        self.completed.push_back(CompletedModuleCallback { id, callback, result });
        true
    }

    /// Forget a pending callback without invoking it
    pub fn cancel(&mut self, id: ModuleCallbackId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Completed callbacks, oldest first
    pub fn take_completed(&mut self) -> Vec<CompletedModuleCallback> {
        self.completed.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Drop every callback without invoking it
    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
    }
}

impl Trace for ModuleCallbackCoordinator {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for callback in self.pending.values() {
            visitor.trace(callback);
        }
        for entry in &self.completed {
            visitor.trace(&entry.callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectId;

    #[test]
    fn test_completion_order() {
        let mut coordinator = ModuleCallbackCoordinator::new();
        let a = coordinator.register(ScriptValue::object(ObjectId(1)));
        let b = coordinator.register(ScriptValue::object(ObjectId(2)));

        assert!(coordinator.complete(b, Ok("b".into())));
        assert!(coordinator.complete(a, Err("failed".into())));
        assert!(!coordinator.complete(a, Ok("again".into())));

        let done = coordinator.take_completed();
        assert_eq!(done.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(done[1].result, Err("failed".to_string()));
        assert_eq!(coordinator.completed_len(), 0);
    }

    #[test]
    fn test_clear() {
        let mut coordinator = ModuleCallbackCoordinator::new();
        let a = coordinator.register(ScriptValue::object(ObjectId(1)));
        coordinator.register(ScriptValue::object(ObjectId(2)));
        coordinator.complete(a, Ok(String::new()));
        coordinator.clear();
        assert_eq!(coordinator.pending_len(), 0);
        assert!(coordinator.take_completed().is_empty());
    }
}
