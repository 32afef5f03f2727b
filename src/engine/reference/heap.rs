//! Object heap and mark-sweep collector
//!
//! The collector works in three phases:
//! 1. Clear: reset every mark bit
//! 2. Mark: trace from the roots; objects with a native peer are traced
//!    through the host's [`NativeGraph`]
//! 3. Sweep: free unmarked objects, reporting their native peers

use super::parser::FunctionDecl;
use crate::engine::{Collection, NativeFunctionId};
use crate::gc::{GcVisitor, NativeGraph, NativeRef};
use crate::value::{ObjectId, ScriptValue};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Engine-internal functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    PromiseResolve,
    PromiseReject,
    PromiseThen,
    PromiseCatch,
    ArrayPush,
    /// Resolving function bound to a promise
    Resolver { promise: ObjectId, reject: bool },
}

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

/// A reaction registered by `then`
#[derive(Debug, Clone)]
pub struct Reaction {
    pub on_fulfilled: ScriptValue,
    pub on_rejected: ScriptValue,
    /// Promise settled with the handler's outcome
    pub derived: Option<ObjectId>,
}

#[derive(Debug, Clone)]
pub struct PromiseData {
    pub state: PromiseState,
    pub reactions: Vec<Reaction>,
    /// A handler was ever attached
    pub handled: bool,
    /// Resolving functions already used
    pub resolved: bool,
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Plain,
    Array(Vec<ScriptValue>),
    Closure {
        decl: Rc<FunctionDecl>,
        captured: Vec<(Rc<str>, ScriptValue)>,
    },
    NativeFunction {
        name: Rc<str>,
        id: NativeFunctionId,
    },
    Builtin(Builtin),
    Promise(PromiseData),
}

#[derive(Debug, Clone)]
pub struct HeapObject {
    pub kind: ObjectKind,
    pub proto: Option<ObjectId>,
    pub props: Vec<(Rc<str>, ScriptValue)>,
    pub native: Option<NativeRef>,
    marked: bool,
}

impl HeapObject {
    pub fn new(kind: ObjectKind, proto: Option<ObjectId>) -> Self {
        HeapObject {
            kind,
            proto,
            props: Vec::new(),
            native: None,
            marked: false,
        }
    }

    pub fn get_own(&self, name: &str) -> Option<&ScriptValue> {
        self.props.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub fn set_own(&mut self, name: &str, value: ScriptValue) {
        match self.props.iter_mut().find(|(k, _)| &**k == name) {
            Some(entry) => entry.1 = value,
            None => self.props.push((Rc::from(name), value)),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Closure { .. } | ObjectKind::NativeFunction { .. } | ObjectKind::Builtin(_)
        )
    }

    /// Push every object this one references
    fn children(&self, out: &mut Vec<ObjectId>) {
        for (_, value) in &self.props {
            push_value(out, value);
        }
        match &self.kind {
            ObjectKind::Plain | ObjectKind::NativeFunction { .. } => {}
            ObjectKind::Array(items) => items.iter().for_each(|v| push_value(out, v)),
            ObjectKind::Closure { captured, .. } => captured.iter().for_each(|(_, v)| push_value(out, v)),
            ObjectKind::Builtin(Builtin::Resolver { promise, .. }) => out.push(*promise),
            ObjectKind::Builtin(_) => {}
            ObjectKind::Promise(data) => {
                match &data.state {
                    PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => push_value(out, v),
                    PromiseState::Pending => {}
                }
                for reaction in &data.reactions {
                    push_value(out, &reaction.on_fulfilled);
                    push_value(out, &reaction.on_rejected);
                    if let Some(derived) = reaction.derived {
                        out.push(derived);
                    }
                }
            }
        }
        if let Some(proto) = self.proto {
            out.push(proto);
        }
    }
}

#[inline]
fn push_value(out: &mut Vec<ObjectId>, value: &ScriptValue) {
    if let Some(id) = value.as_object() {
        out.push(id);
    }
}

/// All objects of one engine instance
#[derive(Debug)]
pub struct Heap {
    objects: HashMap<ObjectId, HeapObject>,
    next_id: u64,
    allocated_since_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: HashMap::new(),
            next_id: 1,
            allocated_since_gc: 0,
        }
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.allocated_since_gc += 1;
        self.objects.insert(id, object);
        id
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    /// Run a full collection from `roots`
    pub fn collect(&mut self, roots: &[ObjectId], graph: &dyn NativeGraph) -> Collection {
        let objects_before = self.objects.len();

        // Phase 1: Clear marks
        self.clear_marks();

        // Phase 2: Mark reachable objects
        let mut gray: Vec<ObjectId> = roots.to_vec();
        {
            let mut visitor = GcVisitor::new(&mut gray, push_gray);
            graph.trace_roots(&mut visitor);
        }
        while let Some(id) = gray.pop() {
            let native = {
                let Some(object) = self.objects.get_mut(&id) else {
                    continue;
                };
                if object.marked {
                    continue;
                }
                object.marked = true;
                object.children(&mut gray);
                object.native
            };
            if let Some(native) = native {
                let mut forwarded: Vec<ObjectId> = Vec::new();
                let mut visitor = GcVisitor::new(&mut forwarded, push_gray);
                graph.trace_native(native, &mut visitor);
                drop(visitor);
                gray.extend(forwarded);
            }
        }

        // Phase 3: Sweep
        let mut finalized = Vec::new();
        self.objects.retain(|_, object| {
            if !object.marked {
                if let Some(native) = object.native {
                    finalized.push(native);
                }
            }
            object.marked
        });
        self.allocated_since_gc = 0;

        Collection {
            objects_before,
            objects_after: self.objects.len(),
            finalized,
        }
    }

    fn clear_marks(&mut self) {
        for object in self.objects.values_mut() {
            object.marked = false;
        }
    }
}

/// Mark routine handed to the GC bridge: queue the object for marking
fn push_gray(runtime: &mut dyn Any, object: ObjectId) {
    if let Some(gray) = runtime.downcast_mut::<Vec<ObjectId>>() {
        gray.push(object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeId;

    struct Graph {
        /// Native peer → objects it owns
        edges: Vec<(NativeRef, ObjectId)>,
        roots: Vec<ObjectId>,
    }

    impl NativeGraph for Graph {
        fn trace_native(&self, native: NativeRef, visitor: &mut GcVisitor<'_>) {
            for (peer, object) in &self.edges {
                if *peer == native {
                    visitor.trace_object(*object);
                }
            }
        }

        fn trace_roots(&self, visitor: &mut GcVisitor<'_>) {
            for root in &self.roots {
                visitor.trace_object(*root);
            }
        }
    }

    fn empty_graph() -> Graph {
        Graph {
            edges: vec![],
            roots: vec![],
        }
    }

    #[test]
    fn test_collect_unreachable() {
        let mut heap = Heap::new();
        let root = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let kept = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        heap.get_mut(root).unwrap().set_own("child", ScriptValue::object(kept));

        let stats = heap.collect(&[root], &empty_graph());
        assert_eq!(stats.objects_before, 3);
        assert_eq!(stats.objects_after, 2);
        assert!(heap.get(kept).is_some());
        assert_eq!(heap.allocated_since_gc(), 0);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let b = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        heap.get_mut(a).unwrap().set_own("b", ScriptValue::object(b));
        heap.get_mut(b).unwrap().set_own("a", ScriptValue::object(a));
        heap.collect(&[], &empty_graph());
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_native_edges_and_finalization() {
        let mut heap = Heap::new();
        let parent = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let child = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let orphan = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        heap.get_mut(parent).unwrap().native = Some(NativeRef::Node(NodeId(1)));
        heap.get_mut(child).unwrap().native = Some(NativeRef::Node(NodeId(2)));
        heap.get_mut(orphan).unwrap().native = Some(NativeRef::Node(NodeId(3)));

        let graph = Graph {
            edges: vec![(NativeRef::Node(NodeId(1)), child)],
            roots: vec![parent],
        };
        let stats = heap.collect(&[], &graph);
        assert!(heap.get(child).is_some());
        assert!(heap.get(orphan).is_none());
        assert_eq!(stats.finalized, vec![NativeRef::Node(NodeId(3))]);
    }
}
