//! GC bridge
//!
//! Script engines only see their own object graph. Ownership edges that live
//! in native memory (a node's children, listener closures, timer callbacks,
//! pending promise capabilities) are invisible to them, so during the mark
//! phase the engine's collector calls back into the bridge for every native
//! object it visits, and the bridge forwards each script-visible reference
//! that object owns to the collector's mark routine.
//!
//! ```text
//! engine collector                    native graph
//! ────────────────                    ────────────
//! mark(wrapper) ──► native peer? ──► NativeGraph::trace_native(peer, visitor)
//!                                          │
//!                                          ▼
//!                                   Node::trace(visitor)
//!                                     ├── child wrappers
//!                                     └── listener callbacks
//!                                          │
//! mark_func(runtime, id) ◄──────── GcVisitor::trace(value)
//! ```
//!
//! The bridge is backend-agnostic: a [`GcVisitor`] is built from the
//! collector's runtime handle and its mark function, nothing else.
//!
//! Tracing is pure graph walking. It must not evaluate script, mutate the
//! tree or allocate script objects.

mod trace;
mod visitor;

pub use trace::{NativeGraph, NativeRef, Trace};
pub use visitor::{GcVisitor, MarkFunc};

/// Outcome of one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects alive before the pass
    pub objects_before: usize,
    /// Objects alive after the pass
    pub objects_after: usize,
    /// Native peers whose wrapper was swept
    pub finalized: usize,
    /// Native nodes released after the pass
    pub nodes_disposed: usize,
}
