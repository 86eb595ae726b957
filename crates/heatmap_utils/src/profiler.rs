use std::time::Duration;

use tracing::info;

use crate::timer::Stopwatch;

/// Records named timings for the load, analyze and report phases.
#[derive(Default)]
pub struct Profiler {
    phases: Vec<PhaseTiming>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_phase<F, T>(&mut self, name: impl Into<String>, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let watch = Stopwatch::start_new();
        let output = f();
        self.phases.push(PhaseTiming {
            name: name.into(),
            duration: watch.elapsed(),
        });
        output
    }

    pub fn phases(&self) -> &[PhaseTiming] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|phase| phase.duration).sum()
    }

    pub fn log_summary(&self) {
        for phase in &self.phases {
            info!(phase = %phase.name, elapsed_us = phase.duration.as_micros() as u64, "phase timing");
        }
        info!(elapsed_us = self.total().as_micros() as u64, "total");
    }
}

#[derive(Clone, Debug)]
pub struct PhaseTiming {
    pub name: String,
    pub duration: Duration,
}
