//! Rejected promise tracker
//!
//! Fed by the engine's rejection-tracking hook:
//!
//! ```text
//!  reject, no handler        handler attached
//!  ───────────────► unhandled ───────────────► (dropped, silent)
//!                       │
//!                       │ process()
//!                       ▼                handler attached
//!                   reported ─────────────────────────► handled queue
//!                                                           │ process()
//!                                                           ▼
//!                                                   rejectionhandled
//! ```
//!
//! Reported entries are held weakly: they are not traced, and
//! [`RejectedPromises::retain_reported`] drops those whose promise was
//! collected, since no handler can attach to them any more.

use crate::gc::{GcVisitor, Trace};
use crate::value::{ObjectId, ScriptValue};

/// A notification produced by [`RejectedPromises::process`]
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionEvent {
    /// Rejected with no handler by the end of a microtask drain
    Unhandled { promise: ObjectId, reason: ScriptValue },
    /// A handler was attached after the rejection was reported
    Handled { promise: ObjectId, reason: ScriptValue },
}

impl RejectionEvent {
    pub fn promise(&self) -> ObjectId {
        match self {
            RejectionEvent::Unhandled { promise, .. } | RejectionEvent::Handled { promise, .. } => *promise,
        }
    }

    pub fn reason(&self) -> &ScriptValue {
        match self {
            RejectionEvent::Unhandled { reason, .. } | RejectionEvent::Handled { reason, .. } => reason,
        }
    }

    /// DOM event type for the notification
    pub fn event_type(&self) -> &'static str {
        match self {
            RejectionEvent::Unhandled { .. } => "unhandledrejection",
            RejectionEvent::Handled { .. } => "rejectionhandled",
        }
    }
}

#[derive(Debug, Default)]
pub struct RejectedPromises {
    /// Rejected, unhandled, not yet reported; in registration order
    unhandled: Vec<(ObjectId, ScriptValue)>,
    /// Reported as unhandled and still without a handler; not traced
    reported: Vec<(ObjectId, ScriptValue)>,
    /// Reported earlier, handled since
    handled: Vec<(ObjectId, ScriptValue)>,
}

impl RejectedPromises {
    pub fn new() -> Self {
        Self::default()
    }

    /// A promise was rejected with no handler attached
    pub fn track_unhandled(&mut self, promise: ObjectId, reason: ScriptValue) {
        if self.unhandled.iter().any(|(p, _)| *p == promise) {
            return;
        }
        self.unhandled.push((promise, reason));
    }

    /// A handler was attached to a previously unhandled rejected promise
    pub fn track_handled(&mut self, promise: ObjectId) {
        if let Some(idx) = self.unhandled.iter().position(|(p, _)| *p == promise) {
            self.unhandled.remove(idx);
            return;
        }
        if let Some(idx) = self.reported.iter().position(|(p, _)| *p == promise) {
            let entry = self.reported.remove(idx);
            self.handled.push(entry);
        }
    }

    /// Notifications due at the end of a microtask drain: new unhandled
    /// rejections first, then late handlers.
    pub fn process(&mut self) -> Vec<RejectionEvent> {
        let mut events = Vec::with_capacity(self.unhandled.len() + self.handled.len());
        for (promise, reason) in std::mem::take(&mut self.unhandled) {
            events.push(RejectionEvent::Unhandled {
                promise,
                reason: reason.clone(),
            });
            self.reported.push((promise, reason));
        }
        for (promise, reason) in self.handled.drain(..) {
            events.push(RejectionEvent::Handled { promise, reason });
        }
        events
    }

    /// Report the rejections still unreported and forget everything
    pub fn drain_remaining(&mut self) -> Vec<RejectionEvent> {
        let events = self
            .unhandled
            .drain(..)
            .map(|(promise, reason)| RejectionEvent::Unhandled { promise, reason })
            .collect();
        self.clear();
        events
    }

    /// Keep the reported rejections whose promise is still `live`.
    /// Returns how many were dropped.
    pub fn retain_reported(&mut self, live: impl Fn(ObjectId) -> bool) -> usize {
        let before = self.reported.len();
        self.reported.retain(|(promise, _)| live(*promise));
        before - self.reported.len()
    }

    pub fn reported_len(&self) -> usize {
        self.reported.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.unhandled.is_empty() || !self.handled.is_empty()
    }

    pub fn clear(&mut self) {
        self.unhandled.clear();
        self.reported.clear();
        self.handled.clear();
    }
}

impl Trace for RejectedPromises {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for (promise, reason) in self.unhandled.iter().chain(&self.handled) {
            visitor.trace_object(*promise);
            visitor.trace(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(s: &str) -> ScriptValue {
        ScriptValue::string(s)
    }

    #[test]
    fn test_handled_before_report_is_silent() {
        let mut tracker = RejectedPromises::new();
        tracker.track_unhandled(ObjectId(1), reason("x"));
        tracker.track_handled(ObjectId(1));
        assert!(tracker.process().is_empty());
    }

    #[test]
    fn test_report_then_handle() {
        let mut tracker = RejectedPromises::new();
        tracker.track_unhandled(ObjectId(1), reason("a"));
        tracker.track_unhandled(ObjectId(2), reason("b"));
        tracker.track_unhandled(ObjectId(1), reason("a"));

        let events = tracker.process();
        assert_eq!(
            events,
            vec![
                RejectionEvent::Unhandled { promise: ObjectId(1), reason: reason("a") },
                RejectionEvent::Unhandled { promise: ObjectId(2), reason: reason("b") },
            ]
        );
        assert!(tracker.process().is_empty());

        tracker.track_handled(ObjectId(2));
        let events = tracker.process();
        assert_eq!(
            events,
            vec![RejectionEvent::Handled { promise: ObjectId(2), reason: reason("b") }]
        );
        assert_eq!(events[0].event_type(), "rejectionhandled");

        // A second handler produces nothing new
        tracker.track_handled(ObjectId(2));
        assert!(tracker.process().is_empty());
    }

    #[test]
    fn test_drain_remaining() {
        let mut tracker = RejectedPromises::new();
        tracker.track_unhandled(ObjectId(1), reason("a"));
        tracker.process();
        tracker.track_unhandled(ObjectId(3), reason("c"));
        let remaining = tracker.drain_remaining();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].promise(), ObjectId(3));
        assert!(!tracker.has_pending());
        tracker.track_handled(ObjectId(1));
        assert!(tracker.process().is_empty());
    }

    #[test]
    fn test_collected_reported_rejections_are_forgotten() {
        let mut tracker = RejectedPromises::new();
        tracker.track_unhandled(ObjectId(1), reason("a"));
        tracker.track_unhandled(ObjectId(2), reason("b"));
        tracker.process();
        assert_eq!(tracker.reported_len(), 2);

        assert_eq!(tracker.retain_reported(|p| p == ObjectId(2)), 1);
        assert_eq!(tracker.reported_len(), 1);
        tracker.track_handled(ObjectId(1));
        assert!(tracker.process().is_empty());
        tracker.track_handled(ObjectId(2));
        assert_eq!(tracker.process()[0].promise(), ObjectId(2));
    }
}
