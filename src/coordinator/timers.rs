//! Timer coordinator
//!
//! Backs `setTimeout` / `setInterval`. Due timers fire ordered by deadline,
//! ties broken by scheduling order. A tick only fires the timers that were
//! due when it started.

use crate::gc::{GcVisitor, Trace};
use crate::value::ScriptValue;
use std::time::{Duration, Instant};

/// Handle returned to script by `setTimeout` / `setInterval`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

struct Timer {
    id: TimerId,
    deadline: Instant,
    /// Scheduling order, for deadline ties
    seq: u64,
    interval: Option<Duration>,
    callback: ScriptValue,
    args: Vec<ScriptValue>,
}

/// A timer taken for invocation
#[derive(Debug, Clone)]
pub struct FiredTimer {
    pub id: TimerId,
    pub callback: ScriptValue,
    pub args: Vec<ScriptValue>,
}

pub struct TimerCoordinator {
    timers: Vec<Timer>,
    next_id: u32,
    next_seq: u64,
    min_interval: Duration,
}

impl TimerCoordinator {
    pub fn new(min_interval: Duration) -> Self {
        TimerCoordinator {
            timers: Vec::new(),
            next_id: 1,
            next_seq: 0,
            min_interval,
        }
    }

    /// Schedule `callback` to run `delay` after `now`, every `delay` when
    /// `repeat` is set.
    pub fn schedule(
        &mut self,
        now: Instant,
        delay: Duration,
        repeat: bool,
        callback: ScriptValue,
        args: Vec<ScriptValue>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let interval = repeat.then(|| delay.max(self.min_interval));
        let deadline = now + interval.unwrap_or(delay);
        let seq = self.bump_seq();
        self.timers.push(Timer {
            id,
            deadline,
            seq,
            interval,
            callback,
            args,
        });
        id
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Cancel a timer. Unknown or already fired ids are ignored.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Ids of the timers due at `now`, in firing order
    pub fn due(&self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<&Timer> = self.timers.iter().filter(|t| t.deadline <= now).collect();
        due.sort_by_key(|t| (t.deadline, t.seq));
        due.into_iter().map(|t| t.id).collect()
    }

    /// Take a due timer for invocation. One-shot timers are removed;
    /// intervals are re-armed at `deadline + interval`. Returns `None`
    /// when the timer was cancelled in the meantime.
    pub fn fire(&mut self, id: TimerId) -> Option<FiredTimer> {
        let idx = self.timers.iter().position(|t| t.id == id)?;
        match self.timers[idx].interval {
            Some(interval) => {
                let seq = self.bump_seq();
                let timer = &mut self.timers[idx];
                timer.deadline += interval;
                timer.seq = seq;
                Some(FiredTimer {
                    id,
                    callback: timer.callback.clone(),
                    args: timer.args.clone(),
                })
            }
            None => {
                let timer = self.timers.remove(idx);
                Some(FiredTimer {
                    id,
                    callback: timer.callback,
                    args: timer.args,
                })
            }
        }
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Drop every timer without invoking it
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

impl Trace for TimerCoordinator {
    fn trace(&self, visitor: &mut GcVisitor<'_>) {
        for timer in &self.timers {
            visitor.trace(&timer.callback);
            timer.args.trace(visitor);
        }
    }
}
