//! Trace capability for native types

use super::GcVisitor;
use crate::dom::NodeId;
use crate::value::ScriptValue;
use std::collections::VecDeque;

/// Native type owning script-visible references
///
/// `trace` must forward every owned reference; an omission lets the
/// collector free an object that is still reachable from native memory.
pub trait Trace {
    fn trace(&self, visitor: &mut GcVisitor<'_>);
}

/// Native peer attached to a script object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeRef {
    /// A node of the context's tree
    Node(NodeId),
    /// The context's window event target
    Window,
}

/// The native side of the object graph, as seen by a collector
pub trait NativeGraph {
    /// Trace the references owned by one native peer
    fn trace_native(&self, native: NativeRef, visitor: &mut GcVisitor<'_>);

    /// Trace references owned by native structures with no script peer
    fn trace_roots(&self, visitor: &mut GcVisitor<'_>);
}

impl Trace for ScriptValue {
    #[inline]
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        visitor.trace(self);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        if let Some(inner) = self {
            inner.trace(visitor);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for item in self {
            item.trace(visitor);
        }
    }
}

impl<T: Trace> Trace for VecDeque<T> {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for item in self {
            item.trace(visitor);
        }
    }
}
