use crate::model::{HostSample, PerformanceReport, WindowSummary};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

/// Compute window metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<WindowSummary> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    Some(WindowSummary {
        mean,
        median: sorted[n / 2],
        p25: sorted[n / 4],
        p75: sorted[3 * n / 4],
    })
}

/// Host CPU / memory / load sampler with a bounded history window.
pub struct HostMetrics {
    sys: Mutex<System>,
    window: Mutex<VecDeque<HostSample>>,
    capacity: usize,
}

impl HostMetrics {
    pub fn new(capacity: usize) -> Self {
        let mut sys = System::new();
        // Prime CPU usage so the first real sample has a baseline to diff against.
        sys.refresh_cpu_usage();
        Self {
            sys: Mutex::new(sys),
            window: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Take one sample and push it into the window.
    pub fn sample(&self) -> HostSample {
        let sample = {
            let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let total = sys.total_memory();
            let mem_percent = if total == 0 {
                0.0
            } else {
                sys.used_memory() as f64 / total as f64 * 100.0
            };
            let load = System::load_average();
            HostSample {
                cpu_percent: sys.global_cpu_usage() as f64,
                mem_percent,
                load: [load.one, load.five, load.fifteen],
            }
        };
        self.push(sample);
        sample
    }

    fn push(&self, sample: HostSample) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(sample);
    }

    /// Latest sample plus window statistics. Samples on demand when the window is empty.
    pub fn report(&self) -> PerformanceReport {
        let snapshot: Vec<HostSample> = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            window.iter().copied().collect()
        };
        let latest = match snapshot.last() {
            Some(s) => *s,
            None => self.sample(),
        };
        let cpu: Vec<f64> = snapshot.iter().map(|s| s.cpu_percent).collect();
        let mem: Vec<f64> = snapshot.iter().map(|s| s.mem_percent).collect();
        PerformanceReport {
            cpu_percent: latest.cpu_percent,
            mem_percent: latest.mem_percent,
            load: latest.load,
            samples: snapshot.len().max(1),
            cpu_window: compute_metrics(&cpu),
            mem_window: compute_metrics(&mem),
        }
    }

    /// Sample every `interval` until the returned task is aborted.
    pub fn spawn_sampler(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let me = self.clone();
                match tokio::task::spawn_blocking(move || me.sample()).await {
                    Ok(s) => debug!(cpu = s.cpu_percent, mem = s.mem_percent, "host sample"),
                    Err(e) => debug!(error = %e, "host sample task failed"),
                }
            }
        })
    }
}
