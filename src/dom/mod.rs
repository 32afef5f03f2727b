//! Native document tree
//!
//! - `node`: node representation and the per-kind behaviour tables
//! - `tree`: the node arena and the mutation algorithms
//! - `event_target`: listener registry shared by nodes and the window
//! - `event`: event state and dispatch paths

pub mod event;
pub mod event_target;
pub mod node;
pub mod tree;

pub use event::{Event, EventInit, EventPhase};
pub use event_target::{EventTargetData, Listener, ListenerOptions, ListenerRegistry};
pub use node::{Node, NodeId, NodeKindOps, NodeType};
pub use tree::NodeTree;
