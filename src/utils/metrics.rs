// Per-run accounting: stage wall-clock plus named counters (region
// counts, agent fallbacks), reported together at the end of a run.

use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed: Duration,
}

/// Collects stage durations and named counters for one pipeline run.
#[derive(Debug, Default)]
pub struct RunTimings {
    timings: Vec<StageTiming>,
    counters: Vec<(&'static str, u64)>,
}

impl RunTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_stage(&mut self, stage: &'static str) -> StageClock {
        StageClock {
            stage,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, clock: StageClock) {
        self.timings.push(StageTiming {
            stage: clock.stage,
            elapsed: clock.started.elapsed(),
        });
    }

    /// Add `value` to the named counter, creating it at zero first.
    pub fn count(&mut self, name: &'static str, value: u64) {
        match self.counters.iter_mut().find(|(n, _)| *n == name) {
            Some((_, total)) => *total += value,
            None => self.counters.push((name, value)),
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(0, |(_, total)| *total)
    }

    pub fn counters(&self) -> &[(&'static str, u64)] {
        &self.counters
    }

    pub fn stages(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn total(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }

    pub fn log_summary(&self) {
        for timing in &self.timings {
            info!(stage = timing.stage, elapsed_ms = timing.elapsed.as_millis() as u64, "stage finished");
        }
        for (name, total) in &self.counters {
            info!(counter = name, total, "run counter");
        }
        info!(total_ms = self.total().as_millis() as u64, "run finished");
    }
}

pub struct StageClock {
    stage: &'static str,
    started: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_stages_in_order() {
        let mut timings = RunTimings::new();
        let clock = timings.time_stage("stitch");
        timings.record(clock);
        let clock = timings.time_stage("split");
        timings.record(clock);

        let names: Vec<&str> = timings.stages().iter().map(|t| t.stage).collect();
        assert_eq!(names, vec!["stitch", "split"]);
        assert!(timings.total() >= Duration::ZERO);
    }

    #[test]
    fn counters_accumulate_by_name() {
        let mut timings = RunTimings::new();
        timings.count("regions_detected", 4);
        timings.count("filter_fallbacks", 1);
        timings.count("filter_fallbacks", 2);

        assert_eq!(timings.counter("regions_detected"), 4);
        assert_eq!(timings.counter("filter_fallbacks"), 3);
        assert_eq!(timings.counter("never_touched"), 0);
    }
}
