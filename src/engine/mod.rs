//! Script engine seam
//!
//! A context drives its engine through [`ScriptEngine`]; the engine calls
//! back into the context through [`Host`]. Every call that may run script
//! takes the host, so native functions can re-enter the engine.

pub mod reference;

use crate::error::{BridgeError, ScriptError};
use crate::gc::{GcVisitor, NativeGraph, NativeRef, Trace};
use crate::value::{ObjectId, ScriptValue};

pub use reference::ReferenceEngine;

/// Identifier of a host function exposed to script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeFunctionId(pub u32);

/// A promise together with its resolving functions
#[derive(Debug, Clone, PartialEq)]
pub struct PromiseCapability {
    pub promise: ObjectId,
    pub resolve: ScriptValue,
    pub reject: ScriptValue,
}

impl Trace for PromiseCapability {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        visitor.trace_object(self.promise);
        visitor.trace(&self.resolve);
        visitor.trace(&self.reject);
    }
}

/// Result of one collection
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub objects_before: usize,
    pub objects_after: usize,
    /// Native peers whose script object was freed
    pub finalized: Vec<NativeRef>,
}

/// Callbacks from the engine into the embedding context
pub trait Host: NativeGraph {
    /// Invoke a host function
    fn call_native(
        &mut self,
        engine: &mut dyn ScriptEngine,
        function: NativeFunctionId,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError>;

    /// Read a property backed by a native peer. `None` falls through to
    /// ordinary lookup.
    fn get_native_property(
        &mut self,
        engine: &mut dyn ScriptEngine,
        native: NativeRef,
        name: &str,
    ) -> Result<Option<ScriptValue>, ScriptError>;

    /// Write a property backed by a native peer. `false` falls through to
    /// an ordinary property store.
    fn set_native_property(
        &mut self,
        engine: &mut dyn ScriptEngine,
        native: NativeRef,
        name: &str,
        value: &ScriptValue,
    ) -> Result<bool, ScriptError>;

    /// Rejection tracking hook. `handled == false`: `promise` was rejected
    /// with no handler. `handled == true`: a handler was attached to a
    /// rejected promise previously reported with `false`.
    fn promise_rejection_tracker(&mut self, promise: ObjectId, reason: &ScriptValue, handled: bool);
}

/// A script engine instance owned by one context
pub trait ScriptEngine {
    /// Engine name, for diagnostics
    fn name(&self) -> &'static str;

    /// Version stamped into compiled blobs
    fn version(&self) -> u16;

    /// Evaluate source text. `line` is the 1-based line of its first line.
    fn evaluate(
        &mut self,
        host: &mut dyn Host,
        source: &str,
        source_url: &str,
        line: u32,
    ) -> Result<ScriptValue, ScriptError>;

    /// Compile source text to a blob accepted by [`ScriptEngine::evaluate_bytecode`]
    fn compile(&mut self, source: &str, source_url: &str) -> Result<Vec<u8>, ScriptError>;

    /// Evaluate a compiled blob
    fn evaluate_bytecode(&mut self, host: &mut dyn Host, bytes: &[u8]) -> Result<ScriptValue, BridgeError>;

    /// The global object
    fn global(&self) -> ObjectId;

    /// Plain object with an optional prototype and native peer
    fn create_object(&mut self, proto: Option<ObjectId>, native: Option<NativeRef>) -> ObjectId;

    /// Function object dispatching to [`Host::call_native`]
    fn create_function(&mut self, name: &str, function: NativeFunctionId) -> ObjectId;

    fn create_array(&mut self, items: Vec<ScriptValue>) -> ObjectId;

    /// Error object carrying `name`, `message` and `stack`
    fn create_error(&mut self, error: &ScriptError) -> ScriptValue;

    /// Attach a native peer to an existing object
    fn attach_native(&mut self, object: ObjectId, native: NativeRef);

    fn native_of(&self, object: ObjectId) -> Option<NativeRef>;

    /// Define an own data property without consulting the host
    fn define_property(&mut self, object: ObjectId, name: &str, value: ScriptValue);

    /// Property read, consulting native peers along the prototype chain
    fn get_property(
        &mut self,
        host: &mut dyn Host,
        object: ObjectId,
        name: &str,
    ) -> Result<ScriptValue, ScriptError>;

    fn set_property(
        &mut self,
        host: &mut dyn Host,
        object: ObjectId,
        name: &str,
        value: ScriptValue,
    ) -> Result<(), ScriptError>;

    fn is_callable(&self, value: &ScriptValue) -> bool;

    fn call(
        &mut self,
        host: &mut dyn Host,
        function: &ScriptValue,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError>;

    /// String conversion as `console.log` prints it
    fn display(&self, value: &ScriptValue) -> String;

    /// New pending promise with its resolving functions
    fn new_promise_capability(&mut self) -> PromiseCapability;

    fn has_pending_jobs(&self) -> bool;

    /// Run one queued job. `None` when the queue is empty.
    fn run_pending_job(&mut self, host: &mut dyn Host) -> Option<Result<(), ScriptError>>;

    /// Drop queued jobs without running them
    fn clear_pending_jobs(&mut self);

    /// Collect garbage. Native peers are traced through `graph`.
    fn collect_garbage(&mut self, graph: &dyn NativeGraph) -> Collection;

    /// Live heap objects
    fn object_count(&self) -> usize;

    /// Whether `object` is still allocated. Ids are never reused.
    fn is_live(&self, object: ObjectId) -> bool;

    /// Objects allocated since the last collection
    fn allocations_since_gc(&self) -> usize;
}
