//! Event objects and dispatch paths

use super::node::NodeId;
use super::tree::NodeTree;
use crate::error::BridgeError;
use crate::gc::NativeRef;
use crate::value::ObjectId;

/// DOM `eventPhase` values
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    None = 0,
    Capturing = 1,
    AtTarget = 2,
    Bubbling = 3,
}

impl EventPhase {
    /// Whether a listener with the given capture flag runs in this phase
    pub fn invokes(self, capture: bool) -> bool {
        match self {
            EventPhase::Capturing => capture,
            EventPhase::Bubbling => !capture,
            EventPhase::AtTarget => true,
            EventPhase::None => false,
        }
    }
}

/// Parameters for a new event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInit {
    pub event_type: String,
    pub bubbles: bool,
    pub cancelable: bool,
}

impl EventInit {
    pub fn new(event_type: &str) -> Self {
        EventInit {
            event_type: event_type.to_string(),
            bubbles: false,
            cancelable: true,
        }
    }

    pub fn bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }
}

/// Native state of an event being dispatched
#[derive(Debug, Clone)]
pub struct Event {
    pub init: EventInit,
    /// Script object exposing this event
    pub object: ObjectId,
    pub target: NativeRef,
    pub current_target: Option<NativeRef>,
    pub phase: EventPhase,
    pub propagation_stopped: bool,
    pub immediate_propagation_stopped: bool,
    pub default_prevented: bool,
}

impl Event {
    pub fn new(init: EventInit, object: ObjectId, target: NativeRef) -> Self {
        Event {
            init,
            object,
            target,
            current_target: None,
            phase: EventPhase::None,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        if self.init.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }
}

/// Targets an event visits, innermost first
///
/// A node's path is the node and its ancestors; a connected node's path
/// ends with the window.
pub fn event_path(tree: &NodeTree, target: NativeRef) -> Result<Vec<NativeRef>, BridgeError> {
    let NativeRef::Node(node) = target else {
        return Ok(vec![NativeRef::Window]);
    };
    let mut path = Vec::new();
    let mut current: Option<NodeId> = Some(node);
    let mut connected = false;
    while let Some(id) = current {
        path.push(NativeRef::Node(id));
        if id == tree.document() {
            connected = true;
        }
        current = tree.parent_node(id)?;
    }
    if connected {
        path.push(NativeRef::Window);
    }
    Ok(path)
}

/// Expand a path into (target, phase) steps in invocation order
pub fn dispatch_steps(path: &[NativeRef], bubbles: bool) -> Vec<(NativeRef, EventPhase)> {
    let Some((&target, ancestors)) = path.split_first() else {
        return Vec::new();
    };
    let mut steps: Vec<_> = ancestors
        .iter()
        .rev()
        .map(|&t| (t, EventPhase::Capturing))
        .collect();
    steps.push((target, EventPhase::AtTarget));
    if bubbles {
        steps.extend(ancestors.iter().map(|&t| (t, EventPhase::Bubbling)));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_command::UICommandBuffer;

    #[test]
    fn test_phase_filter() {
        assert!(EventPhase::Capturing.invokes(true));
        assert!(!EventPhase::Capturing.invokes(false));
        assert!(EventPhase::Bubbling.invokes(false));
        assert!(EventPhase::AtTarget.invokes(true));
        assert!(EventPhase::AtTarget.invokes(false));
    }

    #[test]
    fn test_event_path() {
        let mut cmds = UICommandBuffer::new(1);
        let mut tree = NodeTree::new(&mut cmds);
        let doc = tree.document();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_element("span", &mut cmds).unwrap();
        tree.append_child(a, b, &mut cmds).unwrap();

        let detached = event_path(&tree, NativeRef::Node(b)).unwrap();
        assert_eq!(detached, vec![NativeRef::Node(b), NativeRef::Node(a)]);

        tree.append_child(doc, a, &mut cmds).unwrap();
        let connected = event_path(&tree, NativeRef::Node(b)).unwrap();
        assert_eq!(
            connected,
            vec![
                NativeRef::Node(b),
                NativeRef::Node(a),
                NativeRef::Node(doc),
                NativeRef::Window
            ]
        );
    }

    #[test]
    fn test_dispatch_steps() {
        let a = NativeRef::Node(NodeId(2));
        let b = NativeRef::Node(NodeId(3));
        let path = [b, a, NativeRef::Window];
        let steps = dispatch_steps(&path, true);
        assert_eq!(
            steps,
            vec![
                (NativeRef::Window, EventPhase::Capturing),
                (a, EventPhase::Capturing),
                (b, EventPhase::AtTarget),
                (a, EventPhase::Bubbling),
                (NativeRef::Window, EventPhase::Bubbling),
            ]
        );
        assert_eq!(dispatch_steps(&path, false).len(), 3);
    }

    #[test]
    fn test_prevent_default_requires_cancelable() {
        let mut init = EventInit::new("x");
        init.cancelable = false;
        let mut event = Event::new(init, ObjectId(1), NativeRef::Window);
        event.prevent_default();
        assert!(!event.default_prevented);
    }
}
