//! Pending promise list
//!
//! Promises created by host bridging operations stay here, together with
//! their resolving functions and the host's data, until the host settles
//! them.

use crate::engine::PromiseCapability;
use crate::gc::{GcVisitor, Trace};
use std::any::Any;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub u32);

/// One in-flight bridging operation
pub struct PromiseContext {
    /// Opaque host data, handed back on settlement
    pub data: Box<dyn Any>,
    pub capability: PromiseCapability,
}

#[derive(Default)]
pub struct PendingPromises {
    entries: BTreeMap<PromiseId, PromiseContext>,
    next_id: u32,
}

impl PendingPromises {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, context: PromiseContext) -> PromiseId {
        self.next_id += 1;
        let id = PromiseId(self.next_id);
        self.entries.insert(id, context);
        id
    }

    pub fn get(&self, id: PromiseId) -> Option<&PromiseContext> {
        self.entries.get(&id)
    }

    /// Remove a promise context for settlement
    pub fn take(&mut self, id: PromiseId) -> Option<PromiseContext> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every unsettled promise context
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Trace for PendingPromises {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for context in self.entries.values() {
            context.capability.trace(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectId, ScriptValue};

    fn capability(n: u64) -> PromiseCapability {
        PromiseCapability {
            promise: ObjectId(n),
            resolve: ScriptValue::object(ObjectId(n + 1)),
            reject: ScriptValue::object(ObjectId(n + 2)),
        }
    }

    #[test]
    fn test_take_returns_data() {
        let mut pending = PendingPromises::new();
        let id = pending.add(PromiseContext {
            data: Box::new(42u32),
            capability: capability(10),
        });
        assert_eq!(pending.len(), 1);
        let context = pending.take(id).unwrap();
        assert_eq!(context.data.downcast_ref::<u32>(), Some(&42));
        assert!(pending.take(id).is_none());
        assert!(pending.is_empty());
    }
}
