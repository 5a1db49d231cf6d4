//! Timing metrics for suite runs.
//!
//! Phases (`parse`, `check`, ...) are timed in microseconds; each analyzed
//! fixture also gets one [`FixtureMetrics`] record.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Statistics for a single metric
#[derive(Debug, Clone)]
pub struct MetricStats {
    pub count: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    samples: Vec<u64>,
}

impl Default for MetricStats {
    fn default() -> Self {
        Self {
            count: 0,
            total_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            samples: Vec::new(),
        }
    }
}

impl MetricStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.min_us = self.min_us.min(duration_us);
        self.max_us = self.max_us.max(duration_us);
        self.samples.push(duration_us);
    }

    pub fn avg_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64
        }
    }

    pub fn percentile(&self, p: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn p50(&self) -> u64 {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(95.0)
    }
}

/// Per-fixture analysis record
#[derive(Debug, Clone)]
pub struct FixtureMetrics {
    pub file: String,
    pub analysis_us: u64,
    pub function_count: usize,
    pub finding_count: usize,
}

/// Metrics shared across harness workers
#[derive(Clone)]
pub struct Metrics {
    start_time: Instant,
    phases: Arc<RwLock<HashMap<String, MetricStats>>>,
    fixtures: Arc<RwLock<Vec<FixtureMetrics>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phases: Arc::new(RwLock::new(HashMap::new())),
            fixtures: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn record_phase(&self, phase: &str, duration: Duration) {
        let mut phases = self.phases.write();
        phases
            .entry(phase.to_string())
            .or_default()
            .record(duration.as_micros() as u64);
    }

    /// Run `f`, recording its duration under `phase`
    pub fn time<T>(&self, phase: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record_phase(phase, start.elapsed());
        result
    }

    pub fn record_fixture(
        &self,
        file: &str,
        duration: Duration,
        function_count: usize,
        finding_count: usize,
    ) {
        self.fixtures.write().push(FixtureMetrics {
            file: file.to_string(),
            analysis_us: duration.as_micros() as u64,
            function_count,
            finding_count,
        });
    }

    pub fn get_phase_stats(&self, phase: &str) -> Option<MetricStats> {
        self.phases.read().get(phase).cloned()
    }

    /// Fixture records sorted by file name
    pub fn get_fixture_metrics(&self) -> Vec<FixtureMetrics> {
        let mut fixtures = self.fixtures.read().clone();
        fixtures.sort_by(|a, b| a.file.cmp(&b.file));
        fixtures
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Markdown report of all metrics
    pub fn report(&self) -> String {
        let mut output = String::new();

        output.push_str("# Analysis Metrics\n\n");
        output.push_str(&format!(
            "**Wall time**: {}ms\n\n",
            self.elapsed().as_millis()
        ));

        output.push_str("## Phases\n\n");
        let phases = self.phases.read().clone();
        if phases.is_empty() {
            output.push_str("*No phases recorded.*\n\n");
        } else {
            output.push_str("| Phase | Count | Avg (µs) | P50 (µs) | P95 (µs) | Min (µs) | Max (µs) |\n");
            output.push_str("|-------|-------|----------|----------|----------|----------|----------|\n");

            let mut names: Vec<_> = phases.iter().collect();
            names.sort_by_key(|(name, _)| *name);
            for (name, stats) in names {
                output.push_str(&format!(
                    "| {} | {} | {:.2} | {} | {} | {} | {} |\n",
                    name,
                    stats.count,
                    stats.avg_us(),
                    stats.p50(),
                    stats.p95(),
                    stats.min_us,
                    stats.max_us
                ));
            }
            output.push('\n');
        }

        let fixtures = self.get_fixture_metrics();
        if !fixtures.is_empty() {
            output.push_str("## Fixtures\n\n");
            output.push_str("| File | Time (µs) | Functions | Findings |\n");
            output.push_str("|------|-----------|-----------|----------|\n");
            for f in &fixtures {
                output.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    f.file, f.analysis_us, f.function_count, f.finding_count
                ));
            }
        }

        output
    }

    pub fn report_json(&self) -> serde_json::Value {
        use serde_json::json;

        let phases: serde_json::Map<String, serde_json::Value> = self
            .phases
            .read()
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    json!({
                        "count": stats.count,
                        "avg_us": stats.avg_us(),
                        "p50_us": stats.p50(),
                        "p95_us": stats.p95(),
                        "min_us": stats.min_us,
                        "max_us": stats.max_us,
                        "total_us": stats.total_us
                    }),
                )
            })
            .collect();

        let fixtures: Vec<serde_json::Value> = self
            .get_fixture_metrics()
            .iter()
            .map(|f| {
                json!({
                    "file": f.file,
                    "analysis_us": f.analysis_us,
                    "function_count": f.function_count,
                    "finding_count": f.finding_count
                })
            })
            .collect();

        json!({
            "elapsed_ms": self.elapsed().as_millis() as u64,
            "phases": phases,
            "fixtures": fixtures
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
