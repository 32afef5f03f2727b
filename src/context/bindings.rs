//! Script-visible surface
//!
//! Host functions are identified by a [`NativeFunction`] id stored in the
//! function object; node properties are resolved through the node's native
//! peer on every access, so they always reflect the tree.

use super::ModuleRequest;
use super::host::ContextHost;
use crate::dom::{EventInit, ListenerOptions, NodeId, NodeType};
use crate::engine::{NativeFunctionId, ScriptEngine};
use crate::error::{BridgeError, ScriptError};
use crate::gc::{GcVisitor, NativeRef, Trace};
use crate::value::{ObjectId, ScriptValue};
use std::time::Duration;

/// Host functions exposed to script
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeFunction {
    SetTimeout,
    SetInterval,
    ClearTimeout,
    ClearInterval,
    ConsoleLog,
    ConsoleWarn,
    ConsoleError,
    InvokeModule,
    AddModuleListener,
    AddEventListener,
    RemoveEventListener,
    DispatchEvent,
    AppendChild,
    Remove,
    RemoveChild,
    InsertBefore,
    ReplaceChild,
    CreateElement,
    CreateTextNode,
    CreateComment,
    CreateDocumentFragment,
    SetAttribute,
    GetAttribute,
    StopPropagation,
    StopImmediatePropagation,
    PreventDefault,
}

impl NativeFunction {
    /// In discriminant order
    const ALL: [NativeFunction; 26] = [
        NativeFunction::SetTimeout,
        NativeFunction::SetInterval,
        NativeFunction::ClearTimeout,
        NativeFunction::ClearInterval,
        NativeFunction::ConsoleLog,
        NativeFunction::ConsoleWarn,
        NativeFunction::ConsoleError,
        NativeFunction::InvokeModule,
        NativeFunction::AddModuleListener,
        NativeFunction::AddEventListener,
        NativeFunction::RemoveEventListener,
        NativeFunction::DispatchEvent,
        NativeFunction::AppendChild,
        NativeFunction::Remove,
        NativeFunction::RemoveChild,
        NativeFunction::InsertBefore,
        NativeFunction::ReplaceChild,
        NativeFunction::CreateElement,
        NativeFunction::CreateTextNode,
        NativeFunction::CreateComment,
        NativeFunction::CreateDocumentFragment,
        NativeFunction::SetAttribute,
        NativeFunction::GetAttribute,
        NativeFunction::StopPropagation,
        NativeFunction::StopImmediatePropagation,
        NativeFunction::PreventDefault,
    ];

    pub fn id(self) -> NativeFunctionId {
        NativeFunctionId(self as u32)
    }

    pub fn from_id(id: NativeFunctionId) -> Option<Self> {
        Self::ALL.get(id.0 as usize).copied()
    }
}

/// Prototype objects shared by every wrapper of a kind
#[derive(Debug, Clone, Copy)]
pub(crate) struct Prototypes {
    pub event_target: ObjectId,
    pub node: ObjectId,
    pub element: ObjectId,
    pub document: ObjectId,
    pub event: ObjectId,
}

const EVENT_TARGET_METHODS: &[(&str, NativeFunction)] = &[
    ("addEventListener", NativeFunction::AddEventListener),
    ("removeEventListener", NativeFunction::RemoveEventListener),
    ("dispatchEvent", NativeFunction::DispatchEvent),
];

const NODE_METHODS: &[(&str, NativeFunction)] = &[
    ("appendChild", NativeFunction::AppendChild),
    ("remove", NativeFunction::Remove),
    ("removeChild", NativeFunction::RemoveChild),
    ("insertBefore", NativeFunction::InsertBefore),
    ("replaceChild", NativeFunction::ReplaceChild),
];

const ELEMENT_METHODS: &[(&str, NativeFunction)] = &[
    ("setAttribute", NativeFunction::SetAttribute),
    ("getAttribute", NativeFunction::GetAttribute),
];

const DOCUMENT_METHODS: &[(&str, NativeFunction)] = &[
    ("createElement", NativeFunction::CreateElement),
    ("createTextNode", NativeFunction::CreateTextNode),
    ("createComment", NativeFunction::CreateComment),
    ("createDocumentFragment", NativeFunction::CreateDocumentFragment),
];

const EVENT_METHODS: &[(&str, NativeFunction)] = &[
    ("stopPropagation", NativeFunction::StopPropagation),
    ("stopImmediatePropagation", NativeFunction::StopImmediatePropagation),
    ("preventDefault", NativeFunction::PreventDefault),
];

fn define_methods(engine: &mut dyn ScriptEngine, object: ObjectId, methods: &[(&str, NativeFunction)]) {
    for &(name, function) in methods {
        let f = engine.create_function(name, function.id());
        engine.define_property(object, name, ScriptValue::object(f));
    }
}

impl Prototypes {
    pub fn create(engine: &mut dyn ScriptEngine) -> Self {
        let event_target = engine.create_object(None, None);
        define_methods(engine, event_target, EVENT_TARGET_METHODS);
        let node = engine.create_object(Some(event_target), None);
        define_methods(engine, node, NODE_METHODS);
        let element = engine.create_object(Some(node), None);
        define_methods(engine, element, ELEMENT_METHODS);
        let document = engine.create_object(Some(node), None);
        define_methods(engine, document, DOCUMENT_METHODS);
        let event = engine.create_object(None, None);
        define_methods(engine, event, EVENT_METHODS);
        Prototypes {
            event_target,
            node,
            element,
            document,
            event,
        }
    }

    pub fn for_node(&self, node_type: NodeType) -> ObjectId {
        match node_type {
            NodeType::Element => self.element,
            NodeType::Document => self.document,
            _ => self.node,
        }
    }
}

impl Trace for Prototypes {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for proto in [self.event_target, self.node, self.element, self.document, self.event] {
            visitor.trace_object(proto);
        }
    }
}

/// Install the globals every context starts with
pub(crate) fn install_globals(host: &mut ContextHost, engine: &mut dyn ScriptEngine) -> Result<(), BridgeError> {
    let global = engine.global();
    engine.attach_native(global, NativeRef::Window);
    engine.define_property(global, "window", ScriptValue::object(global));
    define_methods(engine, global, EVENT_TARGET_METHODS);
    define_methods(
        engine,
        global,
        &[
            ("setTimeout", NativeFunction::SetTimeout),
            ("setInterval", NativeFunction::SetInterval),
            ("clearTimeout", NativeFunction::ClearTimeout),
            ("clearInterval", NativeFunction::ClearInterval),
        ],
    );

    let console = engine.create_object(None, None);
    define_methods(
        engine,
        console,
        &[
            ("log", NativeFunction::ConsoleLog),
            ("warn", NativeFunction::ConsoleWarn),
            ("error", NativeFunction::ConsoleError),
        ],
    );
    engine.define_property(global, "console", ScriptValue::object(console));

    let bridge = engine.create_object(None, None);
    define_methods(
        engine,
        bridge,
        &[
            ("invokeModule", NativeFunction::InvokeModule),
            ("addModuleListener", NativeFunction::AddModuleListener),
        ],
    );
    engine.define_property(global, "bridge", ScriptValue::object(bridge));

    let document = host.tree.document();
    let document_wrapper = host.ensure_wrapper(engine, document)?;
    engine.define_property(global, "document", ScriptValue::object(document_wrapper));

    let html = host.tree.create_element("html", &mut host.commands)?;
    host.append_child(engine, document, html)?;
    Ok(())
}

// Argument helpers

fn arg(args: &[ScriptValue], idx: usize) -> ScriptValue {
    args.get(idx).cloned().unwrap_or_default()
}

fn node_of(engine: &dyn ScriptEngine, value: &ScriptValue, what: &str) -> Result<NodeId, ScriptError> {
    match value.as_object().and_then(|id| engine.native_of(id)) {
        Some(NativeRef::Node(id)) => Ok(id),
        _ => Err(ScriptError::type_error(format!("{} is not a Node", what))),
    }
}

fn optional_node(engine: &dyn ScriptEngine, value: &ScriptValue, what: &str) -> Result<Option<NodeId>, ScriptError> {
    if value.is_nullish() {
        Ok(None)
    } else {
        node_of(engine, value, what).map(Some)
    }
}

fn target_of(engine: &dyn ScriptEngine, this: &ScriptValue) -> Result<NativeRef, ScriptError> {
    this.as_object()
        .and_then(|id| engine.native_of(id))
        .ok_or_else(|| ScriptError::type_error("receiver is not an EventTarget"))
}

fn text_arg(engine: &dyn ScriptEngine, args: &[ScriptValue], idx: usize) -> String {
    engine.display(&arg(args, idx))
}

fn timer_delay(value: &ScriptValue) -> Duration {
    let ms = value.to_number();
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms as u64)
    } else {
        Duration::ZERO
    }
}

fn listener_options(
    host: &mut ContextHost,
    engine: &mut dyn ScriptEngine,
    value: &ScriptValue,
) -> Result<ListenerOptions, ScriptError> {
    match value {
        ScriptValue::Object(id) => {
            let capture = engine.get_property(host, *id, "capture")?.is_truthy();
            let once = engine.get_property(host, *id, "once")?.is_truthy();
            Ok(ListenerOptions { capture, once })
        }
        other => Ok(ListenerOptions {
            capture: other.is_truthy(),
            once: false,
        }),
    }
}

fn console_line(engine: &dyn ScriptEngine, args: &[ScriptValue]) -> String {
    args.iter().map(|a| engine.display(a)).collect::<Vec<_>>().join(" ")
}

/// Dispatch a host function call
pub(crate) fn call(
    host: &mut ContextHost,
    engine: &mut dyn ScriptEngine,
    function: NativeFunctionId,
    this: &ScriptValue,
    args: &[ScriptValue],
) -> Result<ScriptValue, ScriptError> {
    let Some(function) = NativeFunction::from_id(function) else {
        return Err(ScriptError::type_error(format!("unknown native function {}", function.0)));
    };
    match function {
        NativeFunction::SetTimeout | NativeFunction::SetInterval => {
            let callback = arg(args, 0);
            if !engine.is_callable(&callback) {
                return Err(ScriptError::type_error("timer callback is not a function"));
            }
            let repeat = function == NativeFunction::SetInterval;
            let extra = args.get(2..).map(|a| a.to_vec()).unwrap_or_default();
            let id = host
                .timers
                .schedule(host.now, timer_delay(&arg(args, 1)), repeat, callback, extra);
            Ok(ScriptValue::number(id.0 as f64))
        }
        NativeFunction::ClearTimeout | NativeFunction::ClearInterval => {
            let id = arg(args, 0).to_number();
            if id.is_finite() && id >= 0.0 {
                host.timers.cancel(crate::coordinator::TimerId(id as u32));
            }
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::ConsoleLog => {
            log::info!(target: "dombridge::console", "{}", console_line(engine, args));
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::ConsoleWarn => {
            log::warn!(target: "dombridge::console", "{}", console_line(engine, args));
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::ConsoleError => {
            log::error!(target: "dombridge::console", "{}", console_line(engine, args));
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::InvokeModule => invoke_module(host, engine, args),
        NativeFunction::AddModuleListener => {
            let listener = arg(args, 0);
            if !engine.is_callable(&listener) {
                return Err(ScriptError::type_error("module listener is not a function"));
            }
            host.module_listeners.add(listener);
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::AddEventListener | NativeFunction::RemoveEventListener => {
            let target = target_of(engine, this)?;
            let event_type = text_arg(engine, args, 0);
            let callback = arg(args, 1);
            if !engine.is_callable(&callback) {
                return Ok(ScriptValue::Undefined);
            }
            let options = listener_options(host, engine, &arg(args, 2))?;
            let registry = host.listeners_mut(target)?.listeners_mut();
            if function == NativeFunction::AddEventListener {
                registry.add(&event_type, callback, options);
            } else {
                registry.remove(&event_type, &callback, options.capture);
            }
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::DispatchEvent => {
            let target = target_of(engine, this)?;
            let init = match arg(args, 0) {
                ScriptValue::Object(id) => {
                    let event_type = engine.get_property(host, id, "type")?;
                    let bubbles = engine.get_property(host, id, "bubbles")?.is_truthy();
                    EventInit::new(&engine.display(&event_type)).bubbles(bubbles)
                }
                other => EventInit::new(&engine.display(&other)),
            };
            let not_cancelled = host.dispatch_event(engine, target, init, Vec::new())?;
            Ok(ScriptValue::bool(not_cancelled))
        }
        NativeFunction::AppendChild => {
            let parent = node_of(engine, this, "receiver")?;
            let child = node_of(engine, &arg(args, 0), "argument 1")?;
            host.append_child(engine, parent, child)?;
            Ok(arg(args, 0))
        }
        NativeFunction::Remove => {
            let node = node_of(engine, this, "receiver")?;
            host.tree.remove(node, &mut host.commands)?;
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::RemoveChild => {
            let parent = node_of(engine, this, "receiver")?;
            let child = node_of(engine, &arg(args, 0), "argument 1")?;
            host.tree.remove_child(parent, child, &mut host.commands)?;
            Ok(arg(args, 0))
        }
        NativeFunction::InsertBefore => {
            let parent = node_of(engine, this, "receiver")?;
            let child = node_of(engine, &arg(args, 0), "argument 1")?;
            let reference = optional_node(engine, &arg(args, 1), "argument 2")?;
            host.insert_before(engine, parent, child, reference)?;
            Ok(arg(args, 0))
        }
        NativeFunction::ReplaceChild => {
            let parent = node_of(engine, this, "receiver")?;
            let new_child = node_of(engine, &arg(args, 0), "argument 1")?;
            let old_child = node_of(engine, &arg(args, 1), "argument 2")?;
            host.replace_child(engine, parent, new_child, old_child)?;
            Ok(arg(args, 1))
        }
        NativeFunction::CreateElement
        | NativeFunction::CreateTextNode
        | NativeFunction::CreateComment
        | NativeFunction::CreateDocumentFragment => {
            let text = text_arg(engine, args, 0);
            let commands = &mut host.commands;
            let id = match function {
                NativeFunction::CreateElement => host.tree.create_element(&text, commands)?,
                NativeFunction::CreateTextNode => host.tree.create_text(&text, commands),
                NativeFunction::CreateComment => host.tree.create_comment(&text, commands),
                _ => host.tree.create_fragment(commands),
            };
            Ok(ScriptValue::object(host.ensure_wrapper(engine, id)?))
        }
        NativeFunction::SetAttribute => {
            let node = node_of(engine, this, "receiver")?;
            let name = text_arg(engine, args, 0);
            let value = text_arg(engine, args, 1);
            host.tree.set_attribute(node, &name, &value, &mut host.commands)?;
            Ok(ScriptValue::Undefined)
        }
        NativeFunction::GetAttribute => {
            let node = node_of(engine, this, "receiver")?;
            let name = text_arg(engine, args, 0);
            Ok(match host.tree.get(node)?.attribute(&name) {
                Some(value) => ScriptValue::string(value),
                None => ScriptValue::Null,
            })
        }
        NativeFunction::StopPropagation
        | NativeFunction::StopImmediatePropagation
        | NativeFunction::PreventDefault => {
            let Some(object) = this.as_object() else {
                return Ok(ScriptValue::Undefined);
            };
            let Some(event) = host.dispatching_event_mut(object) else {
                return Ok(ScriptValue::Undefined);
            };
            match function {
                NativeFunction::StopPropagation => event.stop_propagation(),
                NativeFunction::StopImmediatePropagation => event.stop_immediate_propagation(),
                _ => {
                    event.prevent_default();
                    let prevented = event.default_prevented;
                    engine.define_property(object, "defaultPrevented", ScriptValue::bool(prevented));
                }
            }
            Ok(ScriptValue::Undefined)
        }
    }
}

/// `bridge.invokeModule(module, method, params, callback)`
fn invoke_module(
    host: &mut ContextHost,
    engine: &mut dyn ScriptEngine,
    args: &[ScriptValue],
) -> Result<ScriptValue, ScriptError> {
    let module = text_arg(engine, args, 0);
    let method = text_arg(engine, args, 1);
    let params = match arg(args, 2) {
        ScriptValue::Undefined => String::new(),
        other => engine.display(&other),
    };
    let callback = arg(args, 3);
    let callback_id = engine
        .is_callable(&callback)
        .then(|| host.module_callbacks.register(callback));

    let Some(handler) = host.module_handler.as_mut() else {
        if let Some(id) = callback_id {
            host.module_callbacks.cancel(id);
        }
        return Err(ScriptError::new(
            "Error",
            format!("module '{}' is not available: no module handler", module),
        ));
    };
    let request = ModuleRequest {
        module: &module,
        method: &method,
        params: &params,
        callback: callback_id,
    };
    match handler(host.context_id, &request) {
        Ok(result) => Ok(ScriptValue::from(result)),
        Err(message) => {
            if let Some(id) = callback_id {
                host.module_callbacks.cancel(id);
            }
            Err(ScriptError::new("Error", message))
        }
    }
}

/// Property read on a native peer
pub(crate) fn get_property(
    host: &mut ContextHost,
    engine: &mut dyn ScriptEngine,
    native: NativeRef,
    name: &str,
) -> Result<Option<ScriptValue>, ScriptError> {
    let NativeRef::Node(id) = native else {
        return Ok(None);
    };
    let tree = &host.tree;
    let node = tree.get(id)?;
    let node_type = node.node_type();
    let related = match name {
        "nodeType" => return Ok(Some(ScriptValue::number(node_type as u8 as f64))),
        "nodeName" => return Ok(Some(ScriptValue::from(node.node_name()))),
        "tagName" if node_type == NodeType::Element => return Ok(Some(ScriptValue::from(node.node_name()))),
        "isConnected" => return Ok(Some(ScriptValue::bool(tree.is_connected(id)?))),
        "textContent" => {
            return Ok(Some(match tree.text_content(id)? {
                Some(text) => ScriptValue::from(text),
                None => ScriptValue::Null,
            }));
        }
        "data" if node_type.is_character_data() => return Ok(Some(ScriptValue::string(node.data()))),
        "childNodes" => {
            let children = node.children().to_vec();
            let mut items = Vec::with_capacity(children.len());
            for child in children {
                items.push(ScriptValue::object(host.ensure_wrapper(engine, child)?));
            }
            return Ok(Some(ScriptValue::object(engine.create_array(items))));
        }
        "parentNode" => tree.parent_node(id)?,
        "firstChild" => tree.first_child(id)?,
        "lastChild" => tree.last_child(id)?,
        "previousSibling" => tree.previous_sibling(id)?,
        "nextSibling" => tree.next_sibling(id)?,
        "documentElement" if node_type == NodeType::Document => node
            .children()
            .iter()
            .copied()
            .find(|c| tree.get(*c).is_ok_and(|n| n.node_type() == NodeType::Element)),
        _ => return Ok(None),
    };
    Ok(Some(host.node_value(engine, related)?))
}

const READ_ONLY: &[&str] = &[
    "nodeType",
    "nodeName",
    "tagName",
    "isConnected",
    "childNodes",
    "parentNode",
    "firstChild",
    "lastChild",
    "previousSibling",
    "nextSibling",
    "documentElement",
];

/// Property write on a native peer
pub(crate) fn set_property(
    host: &mut ContextHost,
    engine: &mut dyn ScriptEngine,
    native: NativeRef,
    name: &str,
    value: &ScriptValue,
) -> Result<bool, ScriptError> {
    let NativeRef::Node(id) = native else {
        return Ok(false);
    };
    let node_type = host.tree.get(id)?.node_type();
    if READ_ONLY.contains(&name) {
        return Ok(true);
    }
    match name {
        "data" | "textContent" if node_type.is_character_data() => {
            let text = engine.display(value);
            host.tree.set_data(id, &text, &mut host.commands)?;
            Ok(true)
        }
        "textContent" if matches!(node_type, NodeType::Element | NodeType::DocumentFragment) => {
            let children = host.tree.child_nodes(id)?.to_vec();
            for child in children {
                host.tree.remove(child, &mut host.commands)?;
            }
            let text = match value {
                ScriptValue::Null | ScriptValue::Undefined => String::new(),
                other => engine.display(other),
            };
            if !text.is_empty() {
                let text_node = host.tree.create_text(&text, &mut host.commands);
                host.append_child(engine, id, text_node)?;
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}
