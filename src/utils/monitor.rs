use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

const MB: u64 = 1024 * 1024;

/// Process usage right after a script (or the whole run) finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    pub label: String,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub memory_percent: f32,
    pub elapsed: Duration,
}

/// Samples this process between scripts when a job runs with `--monitor`.
pub struct RunMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    samples: Mutex<Vec<ResourceSample>>,
}

impl RunMonitor {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("⚠️ Could not determine current PID, resource sampling disabled");
        }
        let mut system = System::new();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            pid,
            started: Instant::now(),
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pid.is_some()
    }

    /// Take a sample and remember it under `label`.
    pub fn sample(&self, label: &str) -> Option<ResourceSample> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = system.process(pid)?;
        let memory_mb = process.memory() / MB;
        let total_mb = system.total_memory() / MB;
        let sample = ResourceSample {
            label: label.to_string(),
            cpu_usage: process.cpu_usage(),
            memory_mb,
            memory_percent: if total_mb > 0 {
                memory_mb as f32 / total_mb as f32 * 100.0
            } else {
                0.0
            },
            elapsed: self.started.elapsed(),
        };
        self.samples.lock().ok()?.push(sample.clone());
        Some(sample)
    }

    pub fn log_sample(&self, label: &str) {
        if let Some(s) = self.sample(label) {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB ({:.1}%), Time: {:?}",
                s.label,
                s.cpu_usage,
                s.memory_mb,
                s.memory_percent,
                s.elapsed
            );
        }
    }

    /// Highest resident memory seen in any sample so far.
    pub fn peak_memory_mb(&self) -> u64 {
        self.samples
            .lock()
            .map(|samples| samples.iter().map(|s| s.memory_mb).max().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn samples(&self) -> Vec<ResourceSample> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn log_summary(&self) {
        if !self.is_enabled() {
            return;
        }
        let count = self.samples.lock().map(|s| s.len()).unwrap_or(0);
        tracing::info!(
            "📊 Run finished - {} sample(s), Peak Memory: {}MB, Total Time: {:?}",
            count,
            self.peak_memory_mb(),
            self.started.elapsed()
        );
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new()
    }
}
