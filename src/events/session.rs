//! Session-wide usage summary sent to wildcard subscribers.

use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::execution::TokenUsage;
use crate::util::lock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSummary {
    pub duration_seconds: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub tasks_running: usize,
    pub is_paused: bool,
}

/// Something that can describe the current session.
pub trait SessionSource: Send + Sync {
    fn summary(&self) -> SessionSummary;
}

struct Totals {
    tokens: TokenUsage,
    cost_usd: f64,
    running: usize,
    paused: bool,
}

/// Accumulates usage across every run in this process.
pub struct SessionTracker {
    started: Instant,
    totals: Mutex<Totals>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            totals: Mutex::new(Totals {
                tokens: TokenUsage::default(),
                cost_usd: 0.0,
                running: 0,
                paused: false,
            }),
        }
    }

    pub fn add_usage(&self, tokens: &TokenUsage, cost_usd: f64) {
        let mut totals = lock(&self.totals);
        totals.tokens.add(tokens);
        totals.cost_usd += cost_usd;
    }

    pub fn run_started(&self) {
        lock(&self.totals).running += 1;
    }

    pub fn run_finished(&self) {
        let mut totals = lock(&self.totals);
        totals.running = totals.running.saturating_sub(1);
    }

    pub fn set_paused(&self, paused: bool) {
        lock(&self.totals).paused = paused;
    }
}

impl SessionSource for SessionTracker {
    fn summary(&self) -> SessionSummary {
        let totals = lock(&self.totals);
        SessionSummary {
            duration_seconds: self.started.elapsed().as_secs(),
            total_tokens: totals.tokens.total,
            input_tokens: totals.tokens.input,
            output_tokens: totals.tokens.output,
            estimated_cost_usd: totals.cost_usd,
            tasks_running: totals.running,
            is_paused: totals.paused,
        }
    }
}
