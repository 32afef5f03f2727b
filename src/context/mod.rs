//! Executing context
//!
//! One context per script realm. It owns the engine instance, the document
//! tree, the coordinators and the command buffer, and drives them through
//! script turns:
//!
//! ```text
//! evaluate / tick
//!   ├── run script (timers, module callbacks, module events)
//!   ├── drain promise jobs, then rejection notifications
//!   ├── collect garbage when the allocation threshold is reached
//!   └── flush the command buffer to the renderer
//! ```
//!
//! After [`ExecutingContext::dispose`] every operation fails with
//! [`BridgeError::ContextDisposed`].

mod bindings;
mod host;

use crate::config::ContextConfig;
use crate::coordinator::{ModuleCallbackId, ModuleResult, PromiseContext, PromiseId, RejectionEvent};
use crate::dom::{EventInit, Node, NodeId, NodeTree};
use crate::engine::{ReferenceEngine, ScriptEngine};
use crate::error::{BridgeError, ScriptError};
use crate::gc::{GcStats, NativeRef};
use crate::registry;
use crate::ui_command::{UICommand, UICommandBuffer, UICommandSink};
use crate::value::{ObjectId, ScriptValue};
use host::ContextHost;
use std::any::Any;
use std::time::Instant;

/// A `bridge.invokeModule` call forwarded to the embedder
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequest<'a> {
    pub module: &'a str,
    pub method: &'a str,
    pub params: &'a str,
    /// Set when script passed a callback; complete it with
    /// [`ExecutingContext::resolve_module_callback`]
    pub callback: Option<ModuleCallbackId>,
}

/// Handles `bridge.invokeModule`. `Ok` is returned to script, `Err` is
/// thrown as an `Error`.
pub type ModuleHandler = Box<dyn FnMut(i32, &ModuleRequest<'_>) -> Result<String, String>>;

/// Receives `unhandledrejection` / `rejectionhandled` notifications
pub type RejectionObserver = Box<dyn FnMut(i32, &RejectionEvent)>;

/// Receives uncaught exceptions
pub type ExceptionHandler = Box<dyn FnMut(i32, &ScriptError)>;

/// What one event-loop turn did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub timers_fired: usize,
    pub module_callbacks: usize,
    pub module_events: usize,
    pub promise_jobs: usize,
}

pub struct ExecutingContext {
    id: i32,
    valid: bool,
    time_origin: Instant,
    config: ContextConfig,
    engine: Option<Box<dyn ScriptEngine>>,
    host: ContextHost,
    owner: Option<Box<dyn Any>>,
}

impl ExecutingContext {
    /// Create a context over `engine`, install the globals and evaluate
    /// every registered plugin.
    pub fn new(engine: Box<dyn ScriptEngine>, config: ContextConfig) -> Result<Self, BridgeError> {
        Self::build(engine, config, None)
    }

    /// Like [`ExecutingContext::new`], with `handler` installed before the
    /// plugins run so it also sees their failures.
    pub fn with_exception_handler(
        engine: Box<dyn ScriptEngine>,
        config: ContextConfig,
        handler: impl FnMut(i32, &ScriptError) + 'static,
    ) -> Result<Self, BridgeError> {
        Self::build(engine, config, Some(Box::new(handler)))
    }

    fn build(
        mut engine: Box<dyn ScriptEngine>,
        config: ContextConfig,
        exception_handler: Option<ExceptionHandler>,
    ) -> Result<Self, BridgeError> {
        let id = registry::allocate_context_id();
        let protos = bindings::Prototypes::create(engine.as_mut());
        let mut host = ContextHost::new(id, protos, config.min_timer_interval);
        host.exception_handler = exception_handler;
        bindings::install_globals(&mut host, engine.as_mut())?;

        let mut context = ExecutingContext {
            id,
            valid: true,
            time_origin: Instant::now(),
            config,
            engine: Some(engine),
            host,
            owner: None,
        };
        context.evaluate_plugins()?;
        log::debug!(
            "context {} created with the {} engine",
            id,
            context.engine.as_ref().map_or("?", |e| e.name())
        );
        Ok(context)
    }

    /// Create a context over a fresh [`ReferenceEngine`]
    pub fn with_reference_engine(config: ContextConfig) -> Result<Self, BridgeError> {
        let engine = ReferenceEngine::new(config.max_call_depth);
        Self::new(Box::new(engine), config)
    }

    fn evaluate_plugins(&mut self) -> Result<(), BridgeError> {
        let plugins = registry::plugin_bytecodes();
        if plugins.is_empty() {
            return Ok(());
        }
        let (engine, host) = self.parts()?;
        host.now = Instant::now();
        for (name, bytecode) in plugins {
            if let Err(e) = engine.evaluate_bytecode(host, &bytecode) {
                log::warn!("plugin '{}' failed to evaluate in context {}: {}", name, host.context_id, e);
                host.report_exception(engine, &ScriptError::from(e));
            }
        }
        self.end_turn()
    }

    fn parts(&mut self) -> Result<(&mut dyn ScriptEngine, &mut ContextHost), BridgeError> {
        match self.engine.as_deref_mut() {
            Some(engine) if self.valid => Ok((engine, &mut self.host)),
            _ => Err(BridgeError::ContextDisposed(self.id)),
        }
    }

    fn engine_ref(&self) -> Result<&dyn ScriptEngine, BridgeError> {
        match self.engine.as_deref() {
            Some(engine) if self.valid => Ok(engine),
            _ => Err(BridgeError::ContextDisposed(self.id)),
        }
    }

    fn ensure_valid(&self) -> Result<(), BridgeError> {
        self.engine_ref().map(|_| ())
    }

    // Identity

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn context_id(&self) -> i32 {
        self.id
    }

    pub fn time_origin(&self) -> Instant {
        self.time_origin
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn set_owner(&mut self, owner: Box<dyn Any>) {
        self.owner = Some(owner);
    }

    /// Opaque embedder handle
    pub fn owner(&self) -> Option<&dyn Any> {
        self.owner.as_deref()
    }

    pub fn engine_name(&self) -> Result<&'static str, BridgeError> {
        Ok(self.engine_ref()?.name())
    }

    pub fn global(&self) -> Result<ObjectId, BridgeError> {
        Ok(self.engine_ref()?.global())
    }

    pub fn define_global_property(&mut self, name: &str, value: ScriptValue) -> Result<(), BridgeError> {
        let (engine, _) = self.parts()?;
        let global = engine.global();
        engine.define_property(global, name, value);
        Ok(())
    }

    /// Read a global property
    pub fn global_property(&mut self, name: &str) -> Result<ScriptValue, BridgeError> {
        let (engine, host) = self.parts()?;
        let global = engine.global();
        Ok(engine.get_property(host, global, name)?)
    }

    /// String conversion of a value, as `console.log` prints it
    pub fn display(&self, value: &ScriptValue) -> Result<String, BridgeError> {
        Ok(self.engine_ref()?.display(value))
    }

    // Collaborators

    /// Attach the renderer receiving flushed commands
    pub fn set_renderer(&mut self, renderer: impl UICommandSink + 'static) {
        self.host.renderer = Some(Box::new(renderer));
    }

    pub fn set_module_handler(
        &mut self,
        handler: impl FnMut(i32, &ModuleRequest<'_>) -> Result<String, String> + 'static,
    ) {
        self.host.module_handler = Some(Box::new(handler));
    }

    pub fn set_rejection_observer(&mut self, observer: impl FnMut(i32, &RejectionEvent) + 'static) {
        self.host.rejection_observer = Some(Box::new(observer));
    }

    pub fn set_exception_handler(&mut self, handler: impl FnMut(i32, &ScriptError) + 'static) {
        self.host.exception_handler = Some(Box::new(handler));
    }

    // Evaluation

    /// Evaluate script text as one turn.
    ///
    /// A failure is reported through the exception handler and the window
    /// `error` event, and returned. Promise jobs queued by the script run
    /// before this returns either way.
    pub fn evaluate(&mut self, source: &str, source_url: &str, line: u32) -> Result<ScriptValue, BridgeError> {
        let source_url = self.config.source_url(source_url).to_string();
        let (engine, host) = self.parts()?;
        host.now = Instant::now();
        let result = engine.evaluate(host, source, &source_url, line);
        if let Err(error) = &result {
            host.report_exception(engine, error);
        }
        self.drain_pending_promise_jobs()?;
        self.end_turn()?;
        Ok(result?)
    }

    /// Evaluate a blob produced by [`ExecutingContext::dump_bytecode`]
    pub fn evaluate_bytecode(&mut self, bytecode: &[u8]) -> Result<ScriptValue, BridgeError> {
        let (engine, host) = self.parts()?;
        host.now = Instant::now();
        let result = engine.evaluate_bytecode(host, bytecode);
        if let Err(BridgeError::Script(error)) = &result {
            host.report_exception(engine, error);
        }
        self.drain_pending_promise_jobs()?;
        self.end_turn()?;
        result
    }

    /// Compile source text to a blob this context's engine accepts
    pub fn dump_bytecode(&mut self, source: &str, source_url: &str) -> Result<Vec<u8>, BridgeError> {
        let source_url = self.config.source_url(source_url).to_string();
        let (engine, _) = self.parts()?;
        Ok(engine.compile(source, &source_url)?)
    }

    /// Report an error raised outside script as if it were uncaught
    pub fn report_error(&mut self, error: &ScriptError) -> Result<(), BridgeError> {
        let (engine, host) = self.parts()?;
        host.report_exception(engine, error);
        Ok(())
    }

    // Event loop

    /// Run queued promise jobs until none are left, then deliver rejection
    /// notifications. Returns the number of jobs run.
    pub fn drain_pending_promise_jobs(&mut self) -> Result<usize, BridgeError> {
        let (engine, host) = self.parts()?;
        let mut jobs = 0;
        loop {
            while let Some(result) = engine.run_pending_job(host) {
                jobs += 1;
                if let Err(error) = result {
                    host.report_exception(engine, &error);
                }
            }
            host.process_rejections(engine);
            if !engine.has_pending_jobs() {
                break;
            }
        }
        Ok(jobs)
    }

    /// One event-loop turn at the current time
    pub fn tick(&mut self) -> Result<TickSummary, BridgeError> {
        self.tick_at(Instant::now())
    }

    /// One event-loop turn: timers due at `now`, completed module callbacks,
    /// module events, then promise jobs.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickSummary, BridgeError> {
        let (engine, host) = self.parts()?;
        host.now = now;
        let timers_fired = host.run_due_timers(engine, now);
        let module_callbacks = host.run_module_callbacks(engine);
        let module_events = host.run_module_events(engine);
        let promise_jobs = self.drain_pending_promise_jobs()?;
        self.end_turn()?;
        let summary = TickSummary {
            timers_fired,
            module_callbacks,
            module_events,
            promise_jobs,
        };
        log::trace!("context {} tick: {:?}", self.id, summary);
        Ok(summary)
    }

    /// Earliest pending timer deadline
    pub fn next_timer_deadline(&self) -> Result<Option<Instant>, BridgeError> {
        self.ensure_valid()?;
        Ok(self.host.timers.next_deadline())
    }

    fn end_turn(&mut self) -> Result<(), BridgeError> {
        let threshold = self.config.gc_threshold;
        if threshold > 0 && self.engine_ref()?.allocations_since_gc() >= threshold {
            self.collect_garbage()?;
        }
        if self.config.flush_on_turn_end {
            self.flush_ui_commands()?;
        }
        Ok(())
    }

    /// Run a full collection, then release the nodes it made unreachable
    pub fn collect_garbage(&mut self) -> Result<GcStats, BridgeError> {
        let (engine, host) = self.parts()?;
        let collection = engine.collect_garbage(&*host);
        for native in &collection.finalized {
            if let NativeRef::Node(id) = native {
                host.tree.wrapper_finalized(*id);
            }
        }
        let nodes_disposed = host.tree.dispose_unreachable();
        let forgotten = host.rejected.retain_reported(|promise| engine.is_live(promise));
        if forgotten > 0 {
            log::trace!("context {} forgot {} collected rejection(s)", host.context_id, forgotten);
        }
        let stats = GcStats {
            objects_before: collection.objects_before,
            objects_after: collection.objects_after,
            finalized: collection.finalized.len(),
            nodes_disposed,
        };
        log::trace!("context {} gc: {:?}", self.id, stats);
        Ok(stats)
    }

    // Command buffer

    /// Hand buffered commands to the renderer. Returns how many were sent;
    /// without a renderer they stay buffered.
    pub fn flush_ui_commands(&mut self) -> Result<usize, BridgeError> {
        self.ensure_valid()?;
        Ok(self.host.flush_commands())
    }

    pub fn ui_command_buffer(&self) -> Result<&UICommandBuffer, BridgeError> {
        self.ensure_valid()?;
        Ok(&self.host.commands)
    }

    /// Take the buffered commands, bypassing the renderer
    pub fn take_ui_commands(&mut self) -> Result<Vec<UICommand>, BridgeError> {
        self.ensure_valid()?;
        Ok(self.host.commands.flush())
    }

    // Tree

    pub fn tree(&self) -> Result<&NodeTree, BridgeError> {
        self.ensure_valid()?;
        Ok(&self.host.tree)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, BridgeError> {
        self.tree()?.get(id)
    }

    pub fn document(&self) -> Result<NodeId, BridgeError> {
        Ok(self.tree()?.document())
    }

    /// The first element child of the document
    pub fn document_element(&self) -> Result<Option<NodeId>, BridgeError> {
        let tree = self.tree()?;
        let document = tree.document();
        Ok(tree
            .child_nodes(document)?
            .iter()
            .copied()
            .find(|id| tree.get(*id).is_ok_and(|n| n.node_type() == crate::dom::NodeType::Element)))
    }

    /// The script object of a node, recreated if it was collected
    pub fn node_wrapper(&mut self, id: NodeId) -> Result<ObjectId, BridgeError> {
        let (engine, host) = self.parts()?;
        host.ensure_wrapper(engine, id)
    }

    pub fn create_element(&mut self, tag: &str) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        let id = host.tree.create_element(tag, &mut host.commands)?;
        host.ensure_wrapper(engine, id)?;
        Ok(id)
    }

    pub fn create_text_node(&mut self, data: &str) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        let id = host.tree.create_text(data, &mut host.commands);
        host.ensure_wrapper(engine, id)?;
        Ok(id)
    }

    pub fn create_comment(&mut self, data: &str) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        let id = host.tree.create_comment(data, &mut host.commands);
        host.ensure_wrapper(engine, id)?;
        Ok(id)
    }

    pub fn create_document_fragment(&mut self) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        let id = host.tree.create_fragment(&mut host.commands);
        host.ensure_wrapper(engine, id)?;
        Ok(id)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        host.append_child(engine, parent, child)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        host.insert_before(engine, parent, child, reference)
    }

    pub fn remove(&mut self, id: NodeId) -> Result<(), BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.remove(id, &mut host.commands)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.remove_child(parent, child, &mut host.commands)
    }

    pub fn replace_child(&mut self, parent: NodeId, new_child: NodeId, old_child: NodeId) -> Result<NodeId, BridgeError> {
        let (engine, host) = self.parts()?;
        host.replace_child(engine, parent, new_child, old_child)
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.set_attribute(id, name, value, &mut host.commands)
    }

    pub fn set_data(&mut self, id: NodeId, data: &str) -> Result<(), BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.set_data(id, data, &mut host.commands)
    }

    /// Keep a detached node alive from native code
    pub fn pin_node(&mut self, id: NodeId) -> Result<u32, BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.pin(id)
    }

    pub fn unpin_node(&mut self, id: NodeId) -> Result<u32, BridgeError> {
        let (_, host) = self.parts()?;
        host.tree.unpin(id)
    }

    /// Dispatch a native-origin event at a node as one turn. Returns false
    /// if a listener cancelled it.
    pub fn dispatch_event(&mut self, target: NodeId, init: EventInit) -> Result<bool, BridgeError> {
        self.dispatch_to(NativeRef::Node(target), init)
    }

    /// Dispatch a native-origin event at the window
    pub fn dispatch_window_event(&mut self, init: EventInit) -> Result<bool, BridgeError> {
        self.dispatch_to(NativeRef::Window, init)
    }

    fn dispatch_to(&mut self, target: NativeRef, init: EventInit) -> Result<bool, BridgeError> {
        let (engine, host) = self.parts()?;
        host.now = Instant::now();
        let not_cancelled = host.dispatch_event(engine, target, init, Vec::new())?;
        self.drain_pending_promise_jobs()?;
        self.end_turn()?;
        Ok(not_cancelled)
    }

    // Promises and modules

    /// Create a promise settled later by [`ExecutingContext::settle_promise`].
    /// `data` is handed back at settlement.
    pub fn create_promise(&mut self, data: Box<dyn Any>) -> Result<(PromiseId, ObjectId), BridgeError> {
        let (engine, host) = self.parts()?;
        let capability = engine.new_promise_capability();
        let promise = capability.promise;
        let id = host.pending.add(PromiseContext { data, capability });
        Ok((id, promise))
    }

    /// Resolve (`Ok`) or reject (`Err`) a pending promise as one turn
    pub fn settle_promise(
        &mut self,
        id: PromiseId,
        outcome: Result<ScriptValue, ScriptValue>,
    ) -> Result<Box<dyn Any>, BridgeError> {
        let (engine, host) = self.parts()?;
        let Some(context) = host.pending.take(id) else {
            return Err(BridgeError::NotFound(format!("promise {} is not pending", id.0)));
        };
        let (function, value) = match outcome {
            Ok(value) => (&context.capability.resolve, value),
            Err(reason) => (&context.capability.reject, reason),
        };
        if let Err(error) = engine.call(host, function, &ScriptValue::Undefined, &[value]) {
            host.report_exception(engine, &error);
        }
        self.drain_pending_promise_jobs()?;
        self.end_turn()?;
        Ok(context.data)
    }

    /// Complete a module callback; it runs on the next tick
    pub fn resolve_module_callback(&mut self, id: ModuleCallbackId, result: ModuleResult) -> Result<bool, BridgeError> {
        let (_, host) = self.parts()?;
        Ok(host.module_callbacks.complete(id, result))
    }

    /// Queue a module event for the module listeners; delivered on the next tick
    pub fn dispatch_module_event(&mut self, module: &str, data: &str) -> Result<(), BridgeError> {
        let (_, host) = self.parts()?;
        host.module_listeners.queue_event(module, data);
        Ok(())
    }

    // Lifetime

    /// Tear the context down. Timers and module callbacks are dropped
    /// without running, queued promise jobs run, remaining unhandled
    /// rejections are reported once, then the tree, the command buffer and
    /// the engine are released. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        let Ok((engine, host)) = self.parts() else {
            return;
        };

        while let Some(result) = engine.run_pending_job(host) {
            if let Err(error) = result {
                host.report_exception(engine, &error);
            }
        }
        for event in host.rejected.drain_remaining() {
            host.report_rejection(engine, &event);
        }
        engine.clear_pending_jobs();

        // After the drain: jobs may still schedule timers or module calls
        host.timers.clear();
        host.module_callbacks.clear();

        host.pending.clear();
        host.module_listeners.clear();
        host.dispatch_stack.clear();
        host.tree.clear();

        if host.renderer.is_some() {
            host.flush_commands();
        } else if !host.commands.is_empty() {
            log::warn!(
                "context {} disposed with {} unflushed UI command(s) and no renderer",
                host.context_id,
                host.commands.len()
            );
        }
        host.commands.clear();

        self.engine = None;
        self.valid = false;
        registry::release_context(self.id);
        log::debug!("context {} disposed", self.id);
    }
}

impl Drop for ExecutingContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context() -> ExecutingContext {
        ExecutingContext::with_reference_engine(ContextConfig::default()).unwrap()
    }

    #[test]
    fn test_globals_are_installed() {
        let mut ctx = context();
        let result = ctx
            .evaluate("typeof setTimeout + ' ' + typeof document.createElement", "", 1)
            .unwrap();
        assert_eq!(result, ScriptValue::string("function function"));
        let result = ctx.evaluate("document.documentElement.tagName", "", 1).unwrap();
        assert_eq!(result, ScriptValue::string("HTML"));
        assert_eq!(ctx.evaluate("window === window.window", "", 1).unwrap(), ScriptValue::bool(true));
    }

    #[test]
    fn test_document_element_is_attached() {
        let ctx = context();
        let html = ctx.document_element().unwrap().unwrap();
        assert_eq!(ctx.node(html).unwrap().local_name(), "html");
        assert!(ctx.tree().unwrap().is_connected(html).unwrap());
    }

    #[test]
    fn test_script_mutations_reach_the_tree() {
        let mut ctx = context();
        ctx.evaluate(
            "let div = document.createElement('div')\ndocument.documentElement.appendChild(div)\ndiv.setAttribute('id', 'main')",
            "app.js",
            1,
        )
        .unwrap();
        let html = ctx.document_element().unwrap().unwrap();
        let div = ctx.tree().unwrap().first_child(html).unwrap().unwrap();
        assert_eq!(ctx.node(div).unwrap().attribute("id"), Some("main"));
    }

    #[test]
    fn test_errors_are_reported_and_returned() {
        let mut ctx = context();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.set_exception_handler(move |_, error| sink.borrow_mut().push(error.name.clone()));
        let err = ctx.evaluate("undefinedFunction()", "bad.js", 1).unwrap_err();
        assert!(matches!(err, BridgeError::Script(ref e) if e.name == "ReferenceError"));
        assert_eq!(*seen.borrow(), vec!["ReferenceError".to_string()]);
    }

    #[test]
    fn test_structural_errors_are_catchable() {
        let mut ctx = context();
        let source = "
            let a = document.createElement('div')
            let b = document.createElement('span')
            a.appendChild(b)
            let name = ''
            try { b.appendChild(a) } catch (e) { name = e.name }
            name
        ";
        assert_eq!(ctx.evaluate(source, "", 1).unwrap(), ScriptValue::string("HierarchyRequestError"));
    }

    #[test]
    fn test_dispose_twice() {
        let mut ctx = context();
        let id = ctx.context_id();
        assert!(registry::is_context_valid(id));
        ctx.dispose();
        ctx.dispose();
        assert!(!ctx.is_valid());
        assert!(!registry::is_context_valid(id));
        assert_eq!(ctx.evaluate("1", "", 1), Err(BridgeError::ContextDisposed(id)));
        assert!(ctx.document().is_err());
    }

    #[test]
    fn test_dump_and_evaluate_bytecode() {
        let mut ctx = context();
        let blob = ctx.dump_bytecode("let answer = 6 * 7\nanswer", "calc.js").unwrap();
        assert_eq!(ctx.evaluate_bytecode(&blob).unwrap(), ScriptValue::number(42.0));
        let err = ctx.evaluate_bytecode(b"garbage").unwrap_err();
        assert!(matches!(err, BridgeError::Bytecode(_)));
    }

    #[test]
    fn test_tick_phase_order() {
        let mut ctx = context();
        ctx.set_module_handler(|_, _| Ok(String::new()));
        ctx.evaluate(
            "let order = ''
            setTimeout(function () {
                order = order + 't'
                Promise.resolve(0).then(function () { order = order + 'p' })
            }, 0)
            bridge.invokeModule('m', 'call', '', function () { order = order + 'c' })
            bridge.addModuleListener(function () { order = order + 'e' })",
            "order.js",
            1,
        )
        .unwrap();
        ctx.resolve_module_callback(ModuleCallbackId(1), Ok(String::new())).unwrap();
        ctx.dispatch_module_event("m", "").unwrap();

        let summary = ctx.tick_at(Instant::now() + std::time::Duration::from_millis(1)).unwrap();
        assert_eq!(
            summary,
            TickSummary {
                timers_fired: 1,
                module_callbacks: 1,
                module_events: 1,
                promise_jobs: 1,
            }
        );
        assert_eq!(ctx.global_property("order").unwrap(), ScriptValue::string("tcep"));
    }

    #[test]
    fn test_dispose_reports_remaining_rejections() {
        let mut ctx = context();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.set_rejection_observer(move |_, event| sink.borrow_mut().push(event.event_type()));
        {
            let (engine, host) = ctx.parts().unwrap();
            let capability = engine.new_promise_capability();
            engine
                .call(host, &capability.reject, &ScriptValue::Undefined, &[ScriptValue::string("late")])
                .unwrap();
        }
        assert!(seen.borrow().is_empty());
        ctx.dispose();
        assert_eq!(*seen.borrow(), vec!["unhandledrejection"]);
    }

    #[test]
    fn test_jobs_drained_by_dispose_leave_no_timers_or_callbacks() {
        let mut ctx = context();
        let requests = Rc::new(RefCell::new(Vec::new()));
        let sink = requests.clone();
        ctx.set_module_handler(move |_, request| {
            sink.borrow_mut().push(request.method.to_string());
            Ok(String::new())
        });
        {
            let (engine, host) = ctx.parts().unwrap();
            engine
                .evaluate(
                    host,
                    "Promise.resolve(0).then(function () {\nsetTimeout(function () {}, 0)\nbridge.invokeModule('Net', 'late', '', function () {})\n})",
                    "dispose.js",
                    1,
                )
                .unwrap();
            assert!(engine.has_pending_jobs());
        }
        ctx.dispose();
        assert_eq!(*requests.borrow(), vec!["late"]);
        assert!(ctx.host.timers.is_empty());
        assert_eq!(ctx.host.module_callbacks.pending_len(), 0);
        assert_eq!(ctx.host.module_callbacks.completed_len(), 0);
    }

    #[test]
    fn test_owner_handle() {
        let mut ctx = context();
        assert!(ctx.owner().is_none());
        ctx.set_owner(Box::new(17u32));
        assert_eq!(ctx.owner().and_then(|o| o.downcast_ref::<u32>()), Some(&17));
    }
}
