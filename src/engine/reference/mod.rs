//! Reference script engine
//!
//! A deterministic tree-walking interpreter for a small script dialect,
//! backed by a mark-sweep heap. It exists so the bridge can be exercised
//! end to end without a production engine.
//!
//! The collector never runs while script is executing: frames live on the
//! Rust stack and are not roots.

mod bytecode;
mod heap;
mod interpreter;
mod lexer;
mod parser;
mod promise;

use crate::engine::{Collection, Host, NativeFunctionId, PromiseCapability, ScriptEngine};
use crate::error::{BridgeError, ScriptError};
use crate::gc::{NativeGraph, NativeRef};
use crate::value::{ObjectId, ScriptValue, format_number};
use heap::{Builtin, Heap, HeapObject, ObjectKind, PromiseState};
use std::collections::VecDeque;
use std::rc::Rc;

pub use bytecode::VERSION as BYTECODE_VERSION;

/// Remaining stack below which recursion moves to a fresh segment
const STACK_RED_ZONE: usize = 64 * 1024;
/// Size of each extra stack segment
const STACK_SEGMENT: usize = 1024 * 1024;

/// Largest array index plus one
const MAX_ARRAY_LENGTH: u64 = u32::MAX as u64;
/// Arrays are stored densely; growth past this is refused
const MAX_DENSE_LENGTH: usize = 1 << 20;

/// Canonical array index for a property name, if it is one
fn array_index(name: &str) -> Option<usize> {
    let index: u64 = name.parse().ok()?;
    if index >= MAX_ARRAY_LENGTH || index.to_string() != name {
        return None;
    }
    usize::try_from(index).ok()
}

fn resize_array(items: &mut Vec<ScriptValue>, len: usize) -> Result<(), ScriptError> {
    if len > MAX_DENSE_LENGTH {
        return Err(ScriptError::range(format!(
            "array length {} exceeds the supported maximum of {}",
            len, MAX_DENSE_LENGTH
        )));
    }
    items.resize(len, ScriptValue::Undefined);
    Ok(())
}

/// A queued microtask
#[derive(Debug, Clone)]
enum Job {
    /// Run a promise reaction handler with the settled value
    Reaction {
        handler: ScriptValue,
        argument: ScriptValue,
        derived: Option<ObjectId>,
        rejected: bool,
    },
}

pub struct ReferenceEngine {
    heap: Heap,
    global: ObjectId,
    promise_proto: ObjectId,
    array_proto: ObjectId,
    jobs: VecDeque<Job>,
    depth: usize,
    max_depth: usize,
}

impl ReferenceEngine {
    pub fn new(max_call_depth: usize) -> Self {
        let mut heap = Heap::new();
        let global = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let promise_proto = heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let array_proto = heap.alloc(HeapObject::new(ObjectKind::Plain, None));

        let mut engine = ReferenceEngine {
            heap,
            global,
            promise_proto,
            array_proto,
            jobs: VecDeque::new(),
            depth: 0,
            max_depth: max_call_depth,
        };

        let then = engine.alloc_builtin(Builtin::PromiseThen);
        let catch = engine.alloc_builtin(Builtin::PromiseCatch);
        engine.define_property(promise_proto, "then", then);
        engine.define_property(promise_proto, "catch", catch);

        let promise_ctor = engine.heap.alloc(HeapObject::new(ObjectKind::Plain, None));
        let resolve = engine.alloc_builtin(Builtin::PromiseResolve);
        let reject = engine.alloc_builtin(Builtin::PromiseReject);
        engine.define_property(promise_ctor, "resolve", resolve);
        engine.define_property(promise_ctor, "reject", reject);
        engine.define_property(global, "Promise", ScriptValue::object(promise_ctor));

        let push = engine.alloc_builtin(Builtin::ArrayPush);
        engine.define_property(array_proto, "push", push);
        engine
    }

    fn alloc_builtin(&mut self, builtin: Builtin) -> ScriptValue {
        ScriptValue::object(self.heap.alloc(HeapObject::new(ObjectKind::Builtin(builtin), None)))
    }

    /// Convert a thrown value into an error report
    fn error_from_value(&self, value: ScriptValue) -> ScriptError {
        let object = value.as_object().and_then(|id| self.heap.get(id));
        let name = object
            .and_then(|o| o.get_own("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("Error")
            .to_string();
        let message = match object.and_then(|o| o.get_own("message")) {
            Some(message) => self.display(message),
            None => self.display(&value),
        };
        let mut error = ScriptError::new(&name, message);
        if let Some(stack) = object.and_then(|o| o.get_own("stack")).and_then(|v| v.as_str()) {
            error.stack = stack.to_string();
        }
        error.with_value(value)
    }

    /// The script value carried by an error, materialized if native code raised it
    fn error_value(&mut self, error: &ScriptError) -> ScriptValue {
        if error.value.is_undefined() {
            self.create_error(error)
        } else {
            error.value.clone()
        }
    }

    fn is_promise(&self, id: ObjectId) -> bool {
        matches!(self.heap.get(id).map(|o| &o.kind), Some(ObjectKind::Promise(_)))
    }

    fn gc_roots(&self) -> Vec<ObjectId> {
        let mut roots = vec![self.global, self.promise_proto, self.array_proto];
        for job in &self.jobs {
            let Job::Reaction {
                handler,
                argument,
                derived,
                ..
            } = job;
            roots.extend(handler.as_object());
            roots.extend(argument.as_object());
            roots.extend(*derived);
        }
        roots
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        ReferenceEngine::new(256)
    }
}

impl ScriptEngine for ReferenceEngine {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn version(&self) -> u16 {
        bytecode::VERSION
    }

    fn evaluate(
        &mut self,
        host: &mut dyn Host,
        source: &str,
        source_url: &str,
        line: u32,
    ) -> Result<ScriptValue, ScriptError> {
        let program = parser::parse(source, source_url, line.max(1))?;
        self.depth = 0;
        self.run_program(host, &program)
    }

    fn compile(&mut self, source: &str, source_url: &str) -> Result<Vec<u8>, ScriptError> {
        parser::parse(source, source_url, 1)?;
        Ok(bytecode::encode(source_url, source))
    }

    fn evaluate_bytecode(&mut self, host: &mut dyn Host, bytes: &[u8]) -> Result<ScriptValue, BridgeError> {
        let decoded = bytecode::decode(bytes)?;
        Ok(self.evaluate(host, &decoded.source, &decoded.source_url, 1)?)
    }

    fn global(&self) -> ObjectId {
        self.global
    }

    fn create_object(&mut self, proto: Option<ObjectId>, native: Option<NativeRef>) -> ObjectId {
        let mut object = HeapObject::new(ObjectKind::Plain, proto);
        object.native = native;
        self.heap.alloc(object)
    }

    fn create_function(&mut self, name: &str, function: NativeFunctionId) -> ObjectId {
        self.heap.alloc(HeapObject::new(
            ObjectKind::NativeFunction {
                name: Rc::from(name),
                id: function,
            },
            None,
        ))
    }

    fn create_array(&mut self, items: Vec<ScriptValue>) -> ObjectId {
        self.heap
            .alloc(HeapObject::new(ObjectKind::Array(items), Some(self.array_proto)))
    }

    fn create_error(&mut self, error: &ScriptError) -> ScriptValue {
        let mut object = HeapObject::new(ObjectKind::Plain, None);
        object.set_own("name", ScriptValue::string(&error.name));
        object.set_own("message", ScriptValue::string(&error.message));
        object.set_own("stack", ScriptValue::string(&error.stack));
        ScriptValue::object(self.heap.alloc(object))
    }

    fn attach_native(&mut self, object: ObjectId, native: NativeRef) {
        if let Some(object) = self.heap.get_mut(object) {
            object.native = Some(native);
        }
    }

    fn native_of(&self, object: ObjectId) -> Option<NativeRef> {
        self.heap.get(object).and_then(|o| o.native)
    }

    fn define_property(&mut self, object: ObjectId, name: &str, value: ScriptValue) {
        if let Some(object) = self.heap.get_mut(object) {
            object.set_own(name, value);
        }
    }

    fn get_property(
        &mut self,
        host: &mut dyn Host,
        object: ObjectId,
        name: &str,
    ) -> Result<ScriptValue, ScriptError> {
        let mut current = Some(object);
        while let Some(id) = current {
            let Some(native) = self.heap.get(id).map(|o| o.native) else {
                break;
            };
            if let Some(native) = native {
                if let Some(value) = host.get_native_property(self, native, name)? {
                    return Ok(value);
                }
            }
            let Some(obj) = self.heap.get(id) else {
                break;
            };
            if let ObjectKind::Array(items) = &obj.kind {
                if name == "length" {
                    return Ok(ScriptValue::number(items.len() as f64));
                }
                if let Some(index) = array_index(name) {
                    return Ok(items.get(index).cloned().unwrap_or_default());
                }
            }
            if let Some(value) = obj.get_own(name) {
                return Ok(value.clone());
            }
            current = obj.proto;
        }
        Ok(ScriptValue::Undefined)
    }

    fn set_property(
        &mut self,
        host: &mut dyn Host,
        object: ObjectId,
        name: &str,
        value: ScriptValue,
    ) -> Result<(), ScriptError> {
        if let Some(native) = self.native_of(object) {
            if host.set_native_property(self, native, name, &value)? {
                return Ok(());
            }
        }
        let Some(obj) = self.heap.get_mut(object) else {
            return Ok(());
        };
        if let ObjectKind::Array(items) = &mut obj.kind {
            if let Some(index) = array_index(name) {
                if index >= items.len() {
                    resize_array(items, index + 1)?;
                }
                items[index] = value;
                return Ok(());
            }
            if name == "length" {
                let len = value.to_number();
                if !(len >= 0.0 && len <= MAX_ARRAY_LENGTH as f64 && len.fract() == 0.0) {
                    return Err(ScriptError::range("invalid array length"));
                }
                resize_array(items, len as usize)?;
                return Ok(());
            }
        }
        obj.set_own(name, value);
        Ok(())
    }

    fn is_callable(&self, value: &ScriptValue) -> bool {
        value
            .as_object()
            .and_then(|id| self.heap.get(id))
            .is_some_and(|o| o.is_callable())
    }

    fn call(
        &mut self,
        host: &mut dyn Host,
        function: &ScriptValue,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        self.call_value(host, function, this, args)
    }

    fn display(&self, value: &ScriptValue) -> String {
        self.display_with(value, &mut Vec::new())
    }

    fn new_promise_capability(&mut self) -> PromiseCapability {
        let promise = self.new_promise();
        let resolve = self.alloc_builtin(Builtin::Resolver { promise, reject: false });
        let reject = self.alloc_builtin(Builtin::Resolver { promise, reject: true });
        PromiseCapability {
            promise,
            resolve,
            reject,
        }
    }

    fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    fn run_pending_job(&mut self, host: &mut dyn Host) -> Option<Result<(), ScriptError>> {
        let job = self.jobs.pop_front()?;
        self.depth = 0;
        Some(self.run_job(host, job))
    }

    fn clear_pending_jobs(&mut self) {
        self.jobs.clear();
    }

    fn collect_garbage(&mut self, graph: &dyn NativeGraph) -> Collection {
        let roots = self.gc_roots();
        let collection = self.heap.collect(&roots, graph);
        log::trace!(
            "reference engine collected {} -> {} objects",
            collection.objects_before,
            collection.objects_after
        );
        collection
    }

    fn object_count(&self) -> usize {
        self.heap.len()
    }

    fn is_live(&self, object: ObjectId) -> bool {
        self.heap.get(object).is_some()
    }

    fn allocations_since_gc(&self) -> usize {
        self.heap.allocated_since_gc()
    }
}

impl ReferenceEngine {
    /// Display conversion. Objects already being printed are not entered again.
    fn display_with(&self, value: &ScriptValue, joining: &mut Vec<ObjectId>) -> String {
        let ScriptValue::Object(id) = value else {
            return match value {
                ScriptValue::Number(n) => format_number(*n),
                other => other.to_string(),
            };
        };
        let Some(object) = self.heap.get(*id) else {
            return "[object Object]".to_string();
        };
        match &object.kind {
            ObjectKind::Array(items) => {
                if joining.contains(id) {
                    return String::new();
                }
                joining.push(*id);
                let text = items
                    .iter()
                    .map(|item| match item {
                        ScriptValue::Undefined | ScriptValue::Null => String::new(),
                        other => {
                            stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.display_with(other, joining))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                joining.pop();
                text
            }
            ObjectKind::Closure { decl, .. } => {
                format!("function {}() {{ ... }}", decl.name.as_deref().unwrap_or(""))
            }
            ObjectKind::NativeFunction { name, .. } => format!("function {}() {{ [native code] }}", name),
            ObjectKind::Builtin(_) => "function () { [native code] }".to_string(),
            ObjectKind::Promise(_) => "[object Promise]".to_string(),
            ObjectKind::Plain => match (object.get_own("name"), object.get_own("message")) {
                (Some(ScriptValue::String(name)), Some(message)) if !joining.contains(id) => {
                    joining.push(*id);
                    let text = format!("{}: {}", name, self.display_with(message, joining));
                    joining.pop();
                    text
                }
                _ => "[object Object]".to_string(),
            },
        }
    }
}

/// Promise state as seen from native code, for inspection
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

impl ReferenceEngine {
    /// Settlement state of a promise object
    pub fn promise_status(&self, promise: ObjectId) -> Option<PromiseStatus> {
        match &self.heap.get(promise)?.kind {
            ObjectKind::Promise(data) => Some(match &data.state {
                PromiseState::Pending => PromiseStatus::Pending,
                PromiseState::Fulfilled(v) => PromiseStatus::Fulfilled(v.clone()),
                PromiseState::Rejected(v) => PromiseStatus::Rejected(v.clone()),
            }),
            _ => None,
        }
    }
}
