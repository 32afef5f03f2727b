//! Context configuration

use std::time::Duration;

/// Configuration for an [`ExecutingContext`](crate::ExecutingContext).
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Heap allocations after which a collection runs at the end of a
    /// script turn. 0 disables automatic collection.
    pub gc_threshold: usize,
    /// Hand the command buffer to the attached renderer at the end of
    /// every script turn.
    pub flush_on_turn_end: bool,
    /// Source url used when the caller passes an empty one.
    pub default_source_url: String,
    /// Lower bound for `setInterval` periods.
    pub min_timer_interval: Duration,
    /// Maximum nested call depth inside the reference engine.
    pub max_call_depth: usize,
}

impl ContextConfig {
    pub fn with_gc_threshold(mut self, allocations: usize) -> Self {
        self.gc_threshold = allocations;
        self
    }

    pub fn with_flush_on_turn_end(mut self, flush: bool) -> Self {
        self.flush_on_turn_end = flush;
        self
    }

    pub fn with_default_source_url(mut self, url: &str) -> Self {
        self.default_source_url = url.to_string();
        self
    }

    pub fn with_min_timer_interval(mut self, interval: Duration) -> Self {
        self.min_timer_interval = interval;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Resolve the source url for an evaluation request
    pub(crate) fn source_url<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() {
            &self.default_source_url
        } else {
            requested
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            gc_threshold: 10_000,
            flush_on_turn_end: true,
            default_source_url: "vm://".to_string(),
            min_timer_interval: Duration::from_millis(1),
            max_call_depth: 256,
        }
    }
}
