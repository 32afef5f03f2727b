//! Event target listener registry

use crate::gc::{GcVisitor, Trace};
use crate::value::ScriptValue;

/// Options accepted by `addEventListener`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
}

/// A registered listener
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    /// Script callable
    pub callback: ScriptValue,
    pub capture: bool,
    pub once: bool,
}

/// Event type → listeners, in registration order
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: Vec<(String, Vec<Listener>)>,
}

impl ListenerRegistry {
    /// Register a listener. Returns false if the same callback is already
    /// registered for the type with the same capture flag.
    pub fn add(&mut self, event_type: &str, callback: ScriptValue, options: ListenerOptions) -> bool {
        let listeners = match self.entries.iter().position(|(ty, _)| ty == event_type) {
            Some(idx) => &mut self.entries[idx].1,
            None => {
                self.entries.push((event_type.to_string(), Vec::new()));
                let last = self.entries.len() - 1;
                &mut self.entries[last].1
            }
        };
        if listeners
            .iter()
            .any(|l| l.callback == callback && l.capture == options.capture)
        {
            return false;
        }
        listeners.push(Listener {
            callback,
            capture: options.capture,
            once: options.once,
        });
        true
    }

    /// Remove a listener matching callback and capture flag
    pub fn remove(&mut self, event_type: &str, callback: &ScriptValue, capture: bool) -> bool {
        let Some(idx) = self.entries.iter().position(|(ty, _)| ty == event_type) else {
            return false;
        };
        let listeners = &mut self.entries[idx].1;
        let before = listeners.len();
        listeners.retain(|l| !(l.callback == *callback && l.capture == capture));
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.entries.remove(idx);
        }
        removed
    }

    /// Snapshot of the listeners for a type
    ///
    /// Dispatch iterates a snapshot so listeners added during dispatch are
    /// not invoked for the current event.
    pub fn listeners(&self, event_type: &str) -> Vec<Listener> {
        self.entries
            .iter()
            .find(|(ty, _)| ty == event_type)
            .map(|(_, listeners)| listeners.clone())
            .unwrap_or_default()
    }

    /// Whether a listener is still registered
    pub fn contains(&self, event_type: &str, callback: &ScriptValue, capture: bool) -> bool {
        self.entries
            .iter()
            .find(|(ty, _)| ty == event_type)
            .is_some_and(|(_, listeners)| {
                listeners
                    .iter()
                    .any(|l| l.callback == *callback && l.capture == capture)
            })
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.entries.iter().any(|(ty, _)| ty == event_type)
    }

    /// Total number of listeners over all types
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, l)| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Trace for ListenerRegistry {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for (_, listeners) in &self.entries {
            for listener in listeners {
                visitor.trace(&listener.callback);
            }
        }
    }
}

/// Native state shared by every event target
#[derive(Debug, Default)]
pub struct EventTargetData {
    listeners: ListenerRegistry,
}

impl EventTargetData {
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }
}

impl Trace for EventTargetData {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        self.listeners.trace(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectId;
    use std::any::Any;

    fn f(id: u64) -> ScriptValue {
        ScriptValue::object(ObjectId(id))
    }

    #[test]
    fn test_insertion_order() {
        let mut reg = ListenerRegistry::default();
        reg.add("click", f(1), ListenerOptions::default());
        reg.add("click", f(2), ListenerOptions { capture: true, once: false });
        reg.add("click", f(3), ListenerOptions::default());
        let callbacks: Vec<_> = reg.listeners("click").into_iter().map(|l| l.callback).collect();
        assert_eq!(callbacks, vec![f(1), f(2), f(3)]);
    }

    #[test]
    fn test_duplicate_is_ignored_per_capture_flag() {
        let mut reg = ListenerRegistry::default();
        assert!(reg.add("click", f(1), ListenerOptions::default()));
        assert!(!reg.add("click", f(1), ListenerOptions::default()));
        assert!(reg.add("click", f(1), ListenerOptions { capture: true, once: false }));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut reg = ListenerRegistry::default();
        reg.add("load", f(1), ListenerOptions::default());
        assert!(!reg.remove("load", &f(1), true));
        assert!(reg.remove("load", &f(1), false));
        assert!(!reg.has_listeners("load"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_trace_visits_each_callback_once() {
        fn record(runtime: &mut dyn Any, object: ObjectId) {
            if let Some(marks) = runtime.downcast_mut::<Vec<ObjectId>>() {
                marks.push(object);
            }
        }
        let mut reg = ListenerRegistry::default();
        reg.add("a", f(1), ListenerOptions::default());
        reg.add("a", f(1), ListenerOptions { capture: true, once: false });
        reg.add("b", f(2), ListenerOptions::default());

        let mut marks: Vec<ObjectId> = Vec::new();
        let mut visitor = GcVisitor::new(&mut marks, record);
        reg.trace(&mut visitor);
        drop(visitor);
        assert_eq!(marks, vec![ObjectId(1), ObjectId(2)]);
    }
}
