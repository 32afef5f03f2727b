//! Promise settlement and reaction jobs
//!
//! Rejection tracking follows the usual embedder contract: the host hears
//! `handled == false` when a promise is rejected with no handler attached,
//! and `handled == true` when a handler is later attached to it.

use super::heap::{HeapObject, ObjectKind, PromiseData, PromiseState, Reaction};
use super::{Job, ReferenceEngine};
use crate::engine::{Host, ScriptEngine};
use crate::error::ScriptError;
use crate::value::{ObjectId, ScriptValue};

impl ReferenceEngine {
    pub(super) fn new_promise(&mut self) -> ObjectId {
        let data = PromiseData {
            state: PromiseState::Pending,
            reactions: Vec::new(),
            handled: false,
            resolved: false,
        };
        self.heap
            .alloc(HeapObject::new(ObjectKind::Promise(data), Some(self.promise_proto)))
    }

    fn promise_data(&mut self, promise: ObjectId) -> Option<&mut PromiseData> {
        match self.heap.get_mut(promise).map(|o| &mut o.kind) {
            Some(ObjectKind::Promise(data)) => Some(data),
            _ => None,
        }
    }

    /// Resolve through a resolving function: only the first call counts
    pub(super) fn settle_once(&mut self, host: &mut dyn Host, promise: ObjectId, reject: bool, value: ScriptValue) {
        let Some(data) = self.promise_data(promise) else {
            return;
        };
        if data.resolved {
            return;
        }
        data.resolved = true;
        if reject {
            self.reject_promise(host, promise, value);
        } else {
            self.resolve_promise(host, promise, value);
        }
    }

    /// Resolve with `value`, adopting its state if it is itself a promise
    pub(super) fn resolve_promise(&mut self, host: &mut dyn Host, promise: ObjectId, value: ScriptValue) {
        match value.as_object() {
            Some(id) if id == promise => {
                let error = ScriptError::type_error("promise resolved with itself");
                let reason = self.error_value(&error);
                self.reject_promise(host, promise, reason);
            }
            Some(id) if self.is_promise(id) => {
                self.perform_then(host, id, ScriptValue::Undefined, ScriptValue::Undefined, Some(promise));
            }
            _ => self.fulfill(promise, value),
        }
    }

    fn fulfill(&mut self, promise: ObjectId, value: ScriptValue) {
        let Some(data) = self.promise_data(promise) else {
            return;
        };
        if !matches!(data.state, PromiseState::Pending) {
            return;
        }
        data.state = PromiseState::Fulfilled(value.clone());
        let reactions = std::mem::take(&mut data.reactions);
        for reaction in reactions {
            self.jobs.push_back(Job::Reaction {
                handler: reaction.on_fulfilled,
                argument: value.clone(),
                derived: reaction.derived,
                rejected: false,
            });
        }
    }

    pub(super) fn reject_promise(&mut self, host: &mut dyn Host, promise: ObjectId, reason: ScriptValue) {
        let Some(data) = self.promise_data(promise) else {
            return;
        };
        if !matches!(data.state, PromiseState::Pending) {
            return;
        }
        data.state = PromiseState::Rejected(reason.clone());
        let reactions = std::mem::take(&mut data.reactions);
        let unhandled = reactions.is_empty() && !data.handled;
        for reaction in reactions {
            self.jobs.push_back(Job::Reaction {
                handler: reaction.on_rejected,
                argument: reason.clone(),
                derived: reaction.derived,
                rejected: true,
            });
        }
        if unhandled {
            host.promise_rejection_tracker(promise, &reason, false);
        }
    }

    /// Register reactions on `promise`, queueing a job at once if it is settled
    pub(super) fn perform_then(
        &mut self,
        host: &mut dyn Host,
        promise: ObjectId,
        on_fulfilled: ScriptValue,
        on_rejected: ScriptValue,
        derived: Option<ObjectId>,
    ) {
        let Some(data) = self.promise_data(promise) else {
            return;
        };
        let was_handled = std::mem::replace(&mut data.handled, true);
        let job = match &data.state {
            PromiseState::Pending => {
                data.reactions.push(Reaction {
                    on_fulfilled,
                    on_rejected,
                    derived,
                });
                return;
            }
            PromiseState::Fulfilled(value) => Job::Reaction {
                handler: on_fulfilled,
                argument: value.clone(),
                derived,
                rejected: false,
            },
            PromiseState::Rejected(reason) => Job::Reaction {
                handler: on_rejected,
                argument: reason.clone(),
                derived,
                rejected: true,
            },
        };
        if let Job::Reaction {
            argument,
            rejected: true,
            ..
        } = &job
        {
            if !was_handled {
                host.promise_rejection_tracker(promise, argument, true);
            }
        }
        self.jobs.push_back(job);
    }

    pub(super) fn run_job(&mut self, host: &mut dyn Host, job: Job) -> Result<(), ScriptError> {
        let Job::Reaction {
            handler,
            argument,
            derived,
            rejected,
        } = job;

        if !self.is_callable(&handler) {
            if let Some(derived) = derived {
                if rejected {
                    self.reject_promise(host, derived, argument);
                } else {
                    self.resolve_promise(host, derived, argument);
                }
            }
            return Ok(());
        }

        let outcome = self.call_value(host, &handler, &ScriptValue::Undefined, &[argument]);
        match (outcome, derived) {
            (Ok(value), Some(derived)) => self.resolve_promise(host, derived, value),
            (Err(error), Some(derived)) => {
                let reason = self.error_value(&error);
                self.reject_promise(host, derived, reason);
            }
            (Ok(_), None) => {}
            (Err(error), None) => return Err(error),
        }
        Ok(())
    }
}
