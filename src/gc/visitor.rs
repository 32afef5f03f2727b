//! Mark forwarding

use crate::value::{ObjectId, ScriptValue};
use std::any::Any;

/// Mark routine exposed by a collector
///
/// `runtime` is the collector's own state, handed back untouched; the
/// collector downcasts it to whatever it registered.
pub type MarkFunc = fn(runtime: &mut dyn Any, object: ObjectId);

/// Forwards native-owned references to a collector's mark routine
///
/// One visitor is created per native object visited. Every object is
/// forwarded at most once per visitor.
pub struct GcVisitor<'rt> {
    runtime: &'rt mut dyn Any,
    mark_func: MarkFunc,
    forwarded: Vec<ObjectId>,
}

impl<'rt> GcVisitor<'rt> {
    pub fn new(runtime: &'rt mut dyn Any, mark_func: MarkFunc) -> Self {
        GcVisitor {
            runtime,
            mark_func,
            forwarded: Vec::new(),
        }
    }

    /// Forward a value; primitives are ignored
    #[inline]
    pub fn trace(&mut self, value: &ScriptValue) {
        if let ScriptValue::Object(id) = value {
            self.trace_object(*id);
        }
    }

    /// Forward an object reference
    pub fn trace_object(&mut self, object: ObjectId) {
        if self.forwarded.contains(&object) {
            return;
        }
        self.forwarded.push(object);

        #[cfg(feature = "trace-gc")]
        log::trace!("gc: forward {}", object);

        (self.mark_func)(&mut *self.runtime, object);
    }

    /// Objects forwarded so far, in order
    pub fn forwarded(&self) -> &[ObjectId] {
        &self.forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(runtime: &mut dyn Any, object: ObjectId) {
        if let Some(marks) = runtime.downcast_mut::<Vec<ObjectId>>() {
            marks.push(object);
        }
    }

    #[test]
    fn test_forwards_objects_only() {
        let mut marks: Vec<ObjectId> = Vec::new();
        let mut visitor = GcVisitor::new(&mut marks, record);
        visitor.trace(&ScriptValue::number(1.0));
        visitor.trace(&ScriptValue::string("x"));
        visitor.trace(&ScriptValue::object(ObjectId(3)));
        drop(visitor);
        assert_eq!(marks, vec![ObjectId(3)]);
    }

    #[test]
    fn test_forwards_once_per_visitor() {
        let mut marks: Vec<ObjectId> = Vec::new();
        let mut visitor = GcVisitor::new(&mut marks, record);
        visitor.trace_object(ObjectId(1));
        visitor.trace_object(ObjectId(2));
        visitor.trace_object(ObjectId(1));
        assert_eq!(visitor.forwarded(), &[ObjectId(1), ObjectId(2)]);
        drop(visitor);
        assert_eq!(marks, vec![ObjectId(1), ObjectId(2)]);
    }
}
