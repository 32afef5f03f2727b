//! Native half of a context
//!
//! `ContextHost` is everything a context owns besides its engine: the tree,
//! the command buffer, the coordinators and the embedder's callbacks. The
//! engine calls back into it through [`Host`], and the collector traces it
//! through [`NativeGraph`].

use super::bindings::{self, Prototypes};
use super::{ExceptionHandler, ModuleHandler, RejectionObserver};
use crate::coordinator::{
    ModuleCallbackCoordinator, ModuleListenerContainer, PendingPromises, RejectedPromises, RejectionEvent,
    TimerCoordinator,
};
use crate::dom::event::{dispatch_steps, event_path};
use crate::dom::{Event, EventInit, EventPhase, EventTargetData, Listener, NodeId, NodeTree};
use crate::engine::{Host, NativeFunctionId, ScriptEngine};
use crate::error::{BridgeError, ScriptError};
use crate::gc::{GcVisitor, NativeGraph, NativeRef, Trace};
use crate::ui_command::{UICommandBuffer, UICommandSink};
use crate::value::{ObjectId, ScriptValue};
use std::time::{Duration, Instant};

pub(crate) struct ContextHost {
    pub context_id: i32,
    pub tree: NodeTree,
    pub commands: UICommandBuffer,
    /// Listeners registered on `window`
    pub window: EventTargetData,
    pub protos: Prototypes,
    pub timers: TimerCoordinator,
    pub module_callbacks: ModuleCallbackCoordinator,
    pub module_listeners: ModuleListenerContainer,
    pub rejected: RejectedPromises,
    pub pending: PendingPromises,
    /// Events being dispatched, innermost last
    pub dispatch_stack: Vec<Event>,
    /// Time of the current turn; timers scheduled during it count from here
    pub now: Instant,
    pub renderer: Option<Box<dyn UICommandSink>>,
    pub module_handler: Option<ModuleHandler>,
    pub rejection_observer: Option<RejectionObserver>,
    pub exception_handler: Option<ExceptionHandler>,
    /// Set while an `error` event is being dispatched
    reporting_error: bool,
}

impl ContextHost {
    pub fn new(context_id: i32, protos: Prototypes, min_timer_interval: Duration) -> Self {
        let mut commands = UICommandBuffer::new(context_id);
        let tree = NodeTree::new(&mut commands);
        ContextHost {
            context_id,
            tree,
            commands,
            window: EventTargetData::default(),
            protos,
            timers: TimerCoordinator::new(min_timer_interval),
            module_callbacks: ModuleCallbackCoordinator::new(),
            module_listeners: ModuleListenerContainer::new(),
            rejected: RejectedPromises::new(),
            pending: PendingPromises::new(),
            dispatch_stack: Vec::new(),
            now: Instant::now(),
            renderer: None,
            module_handler: None,
            rejection_observer: None,
            exception_handler: None,
            reporting_error: false,
        }
    }

    // Wrappers

    /// The script object of a node, created on demand.
    ///
    /// A wrapper created here may belong to a node whose descendants lost
    /// theirs while it was unreachable, so the whole subtree is wrapped.
    pub fn ensure_wrapper(&mut self, engine: &mut dyn ScriptEngine, id: NodeId) -> Result<ObjectId, BridgeError> {
        if let Some(wrapper) = self.tree.get(id)?.wrapper() {
            return Ok(wrapper);
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.tree.get(current)?;
            stack.extend(node.children().iter().copied());
            if node.wrapper().is_some() {
                continue;
            }
            let proto = self.protos.for_node(node.node_type());
            let wrapper = engine.create_object(Some(proto), Some(NativeRef::Node(current)));
            self.tree.set_wrapper(current, wrapper)?;
        }
        self.tree.get(id)?.wrapper().ok_or(BridgeError::InvalidNode(id))
    }

    /// Script value for an optional node: its wrapper, or `null`
    pub fn node_value(&mut self, engine: &mut dyn ScriptEngine, id: Option<NodeId>) -> Result<ScriptValue, BridgeError> {
        match id {
            Some(id) => Ok(ScriptValue::object(self.ensure_wrapper(engine, id)?)),
            None => Ok(ScriptValue::Null),
        }
    }

    pub fn target_value(&mut self, engine: &mut dyn ScriptEngine, target: NativeRef) -> Result<ScriptValue, BridgeError> {
        match target {
            NativeRef::Node(id) => self.node_value(engine, Some(id)),
            NativeRef::Window => Ok(ScriptValue::object(engine.global())),
        }
    }

    // Tree mutations shared by bindings and the native API

    pub fn append_child(
        &mut self,
        engine: &mut dyn ScriptEngine,
        parent: NodeId,
        child: NodeId,
    ) -> Result<NodeId, BridgeError> {
        self.ensure_wrapper(engine, child)?;
        self.tree.append_child(parent, child, &mut self.commands)
    }

    pub fn insert_before(
        &mut self,
        engine: &mut dyn ScriptEngine,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, BridgeError> {
        self.ensure_wrapper(engine, child)?;
        self.tree.insert_before(parent, child, reference, &mut self.commands)
    }

    pub fn replace_child(
        &mut self,
        engine: &mut dyn ScriptEngine,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<NodeId, BridgeError> {
        self.ensure_wrapper(engine, new_child)?;
        self.tree.replace_child(parent, new_child, old_child, &mut self.commands)
    }

    // Listeners

    pub fn listeners_mut(&mut self, target: NativeRef) -> Result<&mut EventTargetData, BridgeError> {
        match target {
            NativeRef::Node(id) => Ok(self.tree.get_mut(id)?.event_target_mut()),
            NativeRef::Window => Ok(&mut self.window),
        }
    }

    fn listener_snapshot(&self, target: NativeRef, event_type: &str) -> Vec<Listener> {
        match target {
            NativeRef::Node(id) => self
                .tree
                .get(id)
                .map(|node| node.event_target().listeners().listeners(event_type))
                .unwrap_or_default(),
            NativeRef::Window => self.window.listeners().listeners(event_type),
        }
    }

    fn still_registered(&self, target: NativeRef, event_type: &str, listener: &Listener) -> bool {
        let registry = match target {
            NativeRef::Node(id) => match self.tree.get(id) {
                Ok(node) => node.event_target().listeners(),
                Err(_) => return false,
            },
            NativeRef::Window => self.window.listeners(),
        };
        registry.contains(event_type, &listener.callback, listener.capture)
    }

    // Events

    /// Dispatch an event through capture, target and bubble phases.
    ///
    /// `extra` properties are defined on the event object before dispatch.
    /// Returns false if a listener cancelled the event.
    pub fn dispatch_event(
        &mut self,
        engine: &mut dyn ScriptEngine,
        target: NativeRef,
        init: EventInit,
        extra: Vec<(&'static str, ScriptValue)>,
    ) -> Result<bool, BridgeError> {
        let path = event_path(&self.tree, target)?;
        let steps = dispatch_steps(&path, init.bubbles);

        let object = engine.create_object(Some(self.protos.event), None);
        let target_value = self.target_value(engine, target)?;
        engine.define_property(object, "type", ScriptValue::string(&init.event_type));
        engine.define_property(object, "bubbles", ScriptValue::bool(init.bubbles));
        engine.define_property(object, "cancelable", ScriptValue::bool(init.cancelable));
        engine.define_property(object, "defaultPrevented", ScriptValue::bool(false));
        engine.define_property(object, "target", target_value);
        for (name, value) in extra {
            engine.define_property(object, name, value);
        }

        let event_type = init.event_type.clone();
        self.dispatch_stack.push(Event::new(init, object, target));
        let depth = self.dispatch_stack.len();
        let outcome = self.run_dispatch_steps(engine, depth, object, &event_type, steps);
        let event = self.dispatch_stack.pop();
        engine.define_property(object, "currentTarget", ScriptValue::Null);
        engine.define_property(object, "eventPhase", ScriptValue::number(EventPhase::None as u8 as f64));
        outcome?;
        Ok(!event.is_some_and(|e| e.default_prevented))
    }

    fn run_dispatch_steps(
        &mut self,
        engine: &mut dyn ScriptEngine,
        depth: usize,
        object: ObjectId,
        event_type: &str,
        steps: Vec<(NativeRef, EventPhase)>,
    ) -> Result<(), BridgeError> {
        for (current, phase) in steps {
            if self.event_at(depth).propagation_stopped {
                break;
            }
            let current_value = self.target_value(engine, current)?;
            {
                let event = self.event_at_mut(depth);
                event.current_target = Some(current);
                event.phase = phase;
            }
            engine.define_property(object, "currentTarget", current_value.clone());
            engine.define_property(object, "eventPhase", ScriptValue::number(phase as u8 as f64));

            for listener in self.listener_snapshot(current, event_type) {
                if self.event_at(depth).immediate_propagation_stopped {
                    break;
                }
                if !phase.invokes(listener.capture) || !self.still_registered(current, event_type, &listener) {
                    continue;
                }
                if listener.once {
                    if let Ok(target) = self.listeners_mut(current) {
                        target
                            .listeners_mut()
                            .remove(event_type, &listener.callback, listener.capture);
                    }
                }
                let args = [ScriptValue::object(object)];
                if let Err(error) = engine.call(self, &listener.callback, &current_value, &args) {
                    self.report_exception(engine, &error);
                }
            }
        }
        Ok(())
    }

    fn event_at(&self, depth: usize) -> &Event {
        &self.dispatch_stack[depth - 1]
    }

    fn event_at_mut(&mut self, depth: usize) -> &mut Event {
        &mut self.dispatch_stack[depth - 1]
    }

    /// The event being dispatched whose script object is `object`
    pub fn dispatching_event_mut(&mut self, object: ObjectId) -> Option<&mut Event> {
        self.dispatch_stack.iter_mut().rev().find(|e| e.object == object)
    }

    // Error reporting

    /// Deliver an uncaught exception to the embedder and the window `error`
    /// event. Errors thrown by `error` listeners are not re-dispatched.
    pub fn report_exception(&mut self, engine: &mut dyn ScriptEngine, error: &ScriptError) {
        let handled = match self.exception_handler.as_mut() {
            Some(handler) => {
                handler(self.context_id, error);
                true
            }
            None => false,
        };

        let mut prevented = false;
        if !self.reporting_error {
            self.reporting_error = true;
            let value = if error.value.is_undefined() {
                engine.create_error(error)
            } else {
                error.value.clone()
            };
            let extra = vec![
                ("message", ScriptValue::from(format!("{}: {}", error.name, error.message))),
                ("filename", ScriptValue::string(&error.source_url)),
                ("lineno", ScriptValue::number(error.line as f64)),
                ("error", value),
            ];
            match self.dispatch_event(engine, NativeRef::Window, EventInit::new("error"), extra) {
                Ok(not_cancelled) => prevented = !not_cancelled,
                Err(e) => log::warn!("could not dispatch error event: {}", e),
            }
            self.reporting_error = false;
        }

        if !handled && !prevented {
            log::warn!("Uncaught {}", error);
            if !error.stack.is_empty() {
                log::debug!("{}", error.stack.trim_end());
            }
        }
    }

    /// Turn tracked rejections into notifications
    pub fn process_rejections(&mut self, engine: &mut dyn ScriptEngine) -> usize {
        let events = self.rejected.process();
        let count = events.len();
        for event in events {
            self.report_rejection(engine, &event);
        }
        count
    }

    pub fn report_rejection(&mut self, engine: &mut dyn ScriptEngine, event: &RejectionEvent) {
        if let Some(observer) = self.rejection_observer.as_mut() {
            observer(self.context_id, event);
        }
        let extra = vec![
            ("promise", ScriptValue::object(event.promise())),
            ("reason", event.reason().clone()),
        ];
        let not_cancelled = self
            .dispatch_event(engine, NativeRef::Window, EventInit::new(event.event_type()), extra)
            .unwrap_or(true);
        if not_cancelled && matches!(event, RejectionEvent::Unhandled { .. }) {
            log::warn!("Uncaught (in promise) {}", engine.display(event.reason()));
        }
    }

    // Timers and modules

    /// Run the timers due at `now`. Returns how many fired.
    pub fn run_due_timers(&mut self, engine: &mut dyn ScriptEngine, now: Instant) -> usize {
        let mut fired = 0;
        for id in self.timers.due(now) {
            let Some(timer) = self.timers.fire(id) else {
                continue;
            };
            fired += 1;
            if let Err(error) = engine.call(self, &timer.callback, &ScriptValue::Undefined, &timer.args) {
                self.report_exception(engine, &error);
            }
        }
        fired
    }

    /// Invoke completed module callbacks as `callback(error, data)`
    pub fn run_module_callbacks(&mut self, engine: &mut dyn ScriptEngine) -> usize {
        let completed = self.module_callbacks.take_completed();
        let count = completed.len();
        for entry in completed {
            let args = match entry.result {
                Ok(data) => [ScriptValue::Null, ScriptValue::from(data)],
                Err(message) => [
                    engine.create_error(&ScriptError::new("Error", message)),
                    ScriptValue::Undefined,
                ],
            };
            if let Err(error) = engine.call(self, &entry.callback, &ScriptValue::Undefined, &args) {
                self.report_exception(engine, &error);
            }
        }
        count
    }

    /// Deliver queued module events to every module listener
    pub fn run_module_events(&mut self, engine: &mut dyn ScriptEngine) -> usize {
        let events = self.module_listeners.take_events();
        if events.is_empty() {
            return 0;
        }
        let listeners = self.module_listeners.listeners();
        for event in &events {
            for listener in &listeners {
                let args = [ScriptValue::string(&event.module), ScriptValue::string(&event.data)];
                if let Err(error) = engine.call(self, listener, &ScriptValue::Undefined, &args) {
                    self.report_exception(engine, &error);
                }
            }
        }
        events.len()
    }

    /// Hand buffered commands to the renderer. Without one they stay
    /// buffered.
    pub fn flush_commands(&mut self) -> usize {
        let Some(renderer) = self.renderer.as_mut() else {
            return 0;
        };
        let commands = self.commands.flush();
        if !commands.is_empty() {
            renderer.consume(self.context_id, &commands);
        }
        commands.len()
    }
}

impl NativeGraph for ContextHost {
    fn trace_native(&self, native: NativeRef, visitor: &mut GcVisitor<'_>) {
        match native {
            NativeRef::Node(id) => self.tree.trace_node(id, visitor),
            NativeRef::Window => self.window.trace(visitor),
        }
    }

    fn trace_roots(&self, visitor: &mut GcVisitor<'_>) {
        self.protos.trace(visitor);
        if let Some(wrapper) = self.tree.get(self.tree.document()).ok().and_then(|d| d.wrapper()) {
            visitor.trace_object(wrapper);
        }
        self.timers.trace(visitor);
        self.module_callbacks.trace(visitor);
        self.module_listeners.trace(visitor);
        self.rejected.trace(visitor);
        self.pending.trace(visitor);
        for event in &self.dispatch_stack {
            visitor.trace_object(event.object);
        }
    }
}

impl Host for ContextHost {
    fn call_native(
        &mut self,
        engine: &mut dyn ScriptEngine,
        function: NativeFunctionId,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        bindings::call(self, engine, function, this, args)
    }

    fn get_native_property(
        &mut self,
        engine: &mut dyn ScriptEngine,
        native: NativeRef,
        name: &str,
    ) -> Result<Option<ScriptValue>, ScriptError> {
        bindings::get_property(self, engine, native, name)
    }

    fn set_native_property(
        &mut self,
        engine: &mut dyn ScriptEngine,
        native: NativeRef,
        name: &str,
        value: &ScriptValue,
    ) -> Result<bool, ScriptError> {
        bindings::set_property(self, engine, native, name, value)
    }

    fn promise_rejection_tracker(&mut self, promise: ObjectId, reason: &ScriptValue, handled: bool) {
        if handled {
            self.rejected.track_handled(promise);
        } else {
            self.rejected.track_unhandled(promise, reason.clone());
        }
    }
}
