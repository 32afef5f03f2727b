//! Per-context coordinators
//!
//! Each coordinator owns one ordered queue and is driven only by the
//! context's tick and dispose hooks.

pub mod module_callbacks;
pub mod module_listeners;
pub mod promises;
pub mod rejected_promises;
pub mod timers;

pub use module_callbacks::{CompletedModuleCallback, ModuleCallbackCoordinator, ModuleCallbackId, ModuleResult};
pub use module_listeners::{ModuleEvent, ModuleListenerContainer};
pub use promises::{PendingPromises, PromiseContext, PromiseId};
pub use rejected_promises::{RejectedPromises, RejectionEvent};
pub use timers::{FiredTimer, TimerCoordinator, TimerId};
