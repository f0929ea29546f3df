//! Stage timing for analysis results.

use std::collections::BTreeMap;
use std::time::Instant;

/// Measures one stage and records it as `<name>_duration_seconds`.
#[derive(Debug)]
pub struct StageTimer {
    name: String,
    started: Instant,
}

impl StageTimer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }

    /// Stops the timer and writes the elapsed seconds into `timings`.
    pub fn record(self, timings: &mut BTreeMap<String, f64>) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        timings.insert(timing_key(&self.name), elapsed);
        elapsed
    }
}

/// Key under which a stage's duration is stored.
pub fn timing_key(name: &str) -> String {
    format!("{}_duration_seconds", name)
}
