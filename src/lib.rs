//! DOM Bridge - an object-bridging runtime between a script engine and a
//! native document tree
//!
//! Script sees `window`, `document` and node objects; the native side owns
//! the tree and streams every mutation to an external renderer as a batch
//! of UI commands.
//!
//! # Features
//! - One [`ExecutingContext`] per script realm, isolated from the others
//! - Node wrappers collected by the engine, native nodes reclaimed after
//! - Timers, module callbacks and promise jobs driven by explicit ticks
//! - Unhandled promise rejection tracking
//! - Compact binary encoding for UI command batches
//! - A deterministic reference engine behind the [`ScriptEngine`] seam
//!
//! # Example
//! ```ignore
//! use dombridge::{ContextConfig, ExecutingContext};
//!
//! let mut ctx = ExecutingContext::with_reference_engine(ContextConfig::default())?;
//! ctx.set_renderer(|context_id, commands: &[dombridge::UICommand]| {
//!     println!("context {} sent {} commands", context_id, commands.len());
//! });
//! ctx.evaluate("document.documentElement.appendChild(document.createElement('div'))", "app.js", 1)?;
//! ```

// Shared values and errors
pub mod config;
pub mod error;
pub mod value;

// Garbage collector bridge
pub mod gc;

// Native document tree
pub mod dom;

// Outgoing command stream
pub mod ui_command;

// Event-loop coordinators
pub mod coordinator;

// Engine seam and the reference engine
pub mod engine;

// Contexts and process-wide state
pub mod context;
pub mod registry;

pub use config::ContextConfig;
pub use context::{ExecutingContext, ModuleRequest, TickSummary};
pub use coordinator::{ModuleCallbackId, PromiseId, RejectionEvent, TimerId};
pub use dom::{EventInit, Node, NodeId, NodeTree, NodeType};
pub use engine::{Host, ReferenceEngine, ScriptEngine};
pub use error::{BridgeError, ScriptError};
pub use gc::{GcStats, NativeRef};
pub use ui_command::{UICommand, UICommandBuffer, UICommandKind, UICommandSink};
pub use value::{ObjectId, ScriptValue};
