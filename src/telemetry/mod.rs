//! Telemetry for the reasoning engine
//!
//! - `init_tracing`: installs the `tracing` subscriber (stderr, `EnvFilter`)
//! - `TelemetryCollector`: in-process record of node and run events

use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "MULTIHOP_LOG";

/// Install the global subscriber; later calls are no-ops
///
/// `MULTIHOP_LOG` (then `RUST_LOG`) takes precedence over `verbosity`:
/// 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn init_tracing(verbosity: u8) {
    INIT.call_once(|| {
        let default_level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(format!("multihop_rag={}", default_level)));

        // A subscriber installed elsewhere (e.g. tests) wins
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    NodeStarted {
        node: String,
        timestamp: Instant,
    },
    NodeCompleted {
        node: String,
        duration_ms: u64,
        timestamp: Instant,
    },
    NodeFailed {
        node: String,
        error: String,
        duration_ms: u64,
        timestamp: Instant,
    },
    RunFinished {
        executions: usize,
        success: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
}

/// Aggregate counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub nodes_started: usize,
    pub nodes_succeeded: usize,
    pub nodes_failed: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
}

/// Telemetry collector; clones share the same buffers
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            match &event {
                TelemetryEvent::NodeStarted { .. } => stats.nodes_started += 1,
                TelemetryEvent::NodeCompleted { .. } => stats.nodes_succeeded += 1,
                TelemetryEvent::NodeFailed { .. } => stats.nodes_failed += 1,
                TelemetryEvent::RunFinished { success: true, .. } => stats.runs_succeeded += 1,
                TelemetryEvent::RunFinished { success: false, .. } => stats.runs_failed += 1,
            }
        }

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn node_started(&self, node: &str) {
        self.record(TelemetryEvent::NodeStarted {
            node: node.to_string(),
            timestamp: Instant::now(),
        });
    }

    pub fn node_completed(&self, node: &str, elapsed: Duration) {
        self.record(TelemetryEvent::NodeCompleted {
            node: node.to_string(),
            duration_ms: millis(elapsed),
            timestamp: Instant::now(),
        });
    }

    pub fn node_failed(&self, node: &str, error: &str, elapsed: Duration) {
        self.record(TelemetryEvent::NodeFailed {
            node: node.to_string(),
            error: error.to_string(),
            duration_ms: millis(elapsed),
            timestamp: Instant::now(),
        });
    }

    pub fn run_finished(&self, executions: usize, success: bool, elapsed: Duration) {
        self.record(TelemetryEvent::RunFinished {
            executions,
            success,
            duration_ms: millis(elapsed),
            timestamp: Instant::now(),
        });
    }

    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Node names in execution order
    pub fn visited_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::NodeStarted { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fraction of node executions that succeeded
    pub fn node_success_rate(&self) -> f64 {
        let stats = self.get_stats();
        let total = stats.nodes_succeeded + stats.nodes_failed;
        if total == 0 {
            1.0
        } else {
            stats.nodes_succeeded as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
