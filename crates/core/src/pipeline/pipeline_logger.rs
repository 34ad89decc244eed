use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::pipeline::pipeline_error::{FailureKind, PipelineError};
use crate::pipeline::pipeline_state::{PipelineState, Resolution};

/// Cross-cutting observer for pipeline invocations.
///
/// One logger is shared by every concurrent `detect_face` call on a
/// controller, so implementations take `&self` and synchronise internally.
/// Nothing a logger does can change an invocation's outcome.
pub trait PipelineLogger: Send + Sync {
    /// A single invocation moved from one state to the next. Default: no-op.
    fn transition(&self, _from: PipelineState, _to: PipelineState) {}

    /// Record how long a named stage took for one invocation.
    fn timing(&self, stage: &str, duration_ms: f64);

    /// A stage failed; the invocation will resolve to `false`.
    fn failure(&self, error: &PipelineError);

    /// The invocation reached its terminal state.
    fn resolved(&self, resolution: Resolution);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn timing(&self, _stage: &str, _duration_ms: f64) {}
    fn failure(&self, _error: &PipelineError) {}
    fn resolved(&self, _resolution: Resolution) {}
}

/// Forwards timings, failures and outcomes to the `log` crate.
pub struct LogPipelineLogger;

impl PipelineLogger for LogPipelineLogger {
    fn timing(&self, stage: &str, duration_ms: f64) {
        log::debug!("{stage} took {duration_ms:.1}ms");
    }

    fn failure(&self, error: &PipelineError) {
        log::info!("Pipeline failed ({}): {}", error.kind(), error.chain());
    }

    fn resolved(&self, resolution: Resolution) {
        log::debug!("Pipeline resolved: {resolution:?}");
    }
}

#[derive(Default)]
struct SummaryStats {
    timings: HashMap<String, Vec<f64>>,
    faces: usize,
    no_faces: usize,
    failures: HashMap<FailureKind, usize>,
}

/// Collects per-stage timing and outcome counts across many invocations
/// and renders them as a report.
pub struct SummaryPipelineLogger {
    stats: Mutex<SummaryStats>,
    start_time: Instant,
}

impl SummaryPipelineLogger {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(SummaryStats::default()),
            start_time: Instant::now(),
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, SummaryStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of invocations that resolved, whatever the outcome.
    pub fn total(&self) -> usize {
        let stats = self.stats();
        stats.faces + stats.no_faces + stats.failures.values().sum::<usize>()
    }

    pub fn faces(&self) -> usize {
        self.stats().faces
    }

    pub fn no_faces(&self) -> usize {
        self.stats().no_faces
    }

    pub fn failures(&self, kind: FailureKind) -> usize {
        self.stats().failures.get(&kind).copied().unwrap_or(0)
    }

    /// Returns a copy of the timing data for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<Vec<f64>> {
        self.stats().timings.get(stage).cloned()
    }

    /// Returns the formatted summary string, or `None` if nothing resolved.
    pub fn summary_string(&self) -> Option<String> {
        let total = self.total();
        if total == 0 {
            return None;
        }

        let stats = self.stats();
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = Vec::new();

        lines.push(format!(
            "Pipeline summary ({total} checks, {:.1}s total):",
            elapsed_ms / 1000.0
        ));
        lines.push(format!("  face found  : {}", stats.faces));
        lines.push(format!("  no face     : {}", stats.no_faces));
        for kind in FailureKind::ALL {
            let count = stats.failures.get(kind).copied().unwrap_or(0);
            if count > 0 {
                lines.push(format!("  failed ({kind}): {count}"));
            }
        }

        let mut stages: Vec<_> = stats.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &stats.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        Some(lines.join("\n"))
    }
}

impl Default for SummaryPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for SummaryPipelineLogger {
    fn timing(&self, stage: &str, duration_ms: f64) {
        self.stats()
            .timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn failure(&self, error: &PipelineError) {
        log::debug!("Recorded {} failure", error.kind());
    }

    fn resolved(&self, resolution: Resolution) {
        let mut stats = self.stats();
        match resolution {
            Resolution::FaceFound => stats.faces += 1,
            Resolution::NoFace => stats.no_faces += 1,
            Resolution::Failed(kind) => *stats.failures.entry(kind).or_default() += 1,
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
