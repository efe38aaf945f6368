//! Periodic performance samples.
//!
//! Request handlers feed a process-wide [`RequestAccumulator`]. Once per
//! interval the loop takes and resets it, samples `/proc/stat`,
//! `/proc/loadavg`, `/proc/self/status` and `/proc/meminfo`, and sends the
//! sample to a [`MetricSink`]. The latest sample is kept for the status
//! endpoint.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::aws::{MetricDatum, MetricSink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestTotals {
    pub requests: u64,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Per-interval request counters, guarded by one mutex.
#[derive(Debug, Default)]
pub struct RequestAccumulator {
    totals: Mutex<RequestTotals>,
}

impl RequestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bytes: u64, elapsed: Duration) {
        let mut t = self.lock();
        t.requests += 1;
        t.bytes += bytes;
        t.elapsed_ms += elapsed.as_millis() as u64;
    }

    pub fn snapshot(&self) -> RequestTotals {
        *self.lock()
    }

    /// Return the totals so far and start a new interval.
    pub fn take(&self) -> RequestTotals {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestTotals> {
        self.totals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Busy and idle jiffies for one CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub idle: u64,
}

/// Per-CPU times from `/proc/stat`. The aggregate `cpu` line is skipped.
///
/// busy = (user - guest) + (nice - guest_nice) + system + irq + softirq;
/// idle = idle + iowait.
pub fn parse_proc_stat(text: &str) -> Vec<CpuTimes> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next()?;
            if !label.starts_with("cpu") || label == "cpu" {
                return None;
            }
            let v: Vec<u64> = fields.map(|f| f.parse().unwrap_or(0)).collect();
            let at = |i: usize| v.get(i).copied().unwrap_or(0);
            let (user, nice, system, idle, iowait, irq, softirq) =
                (at(0), at(1), at(2), at(3), at(4), at(5), at(6));
            let (guest, guest_nice) = (at(8), at(9));
            Some(CpuTimes {
                busy: user.saturating_sub(guest)
                    + nice.saturating_sub(guest_nice)
                    + system
                    + irq
                    + softirq,
                idle: idle + iowait,
            })
        })
        .collect()
}

/// Percentage of time busy between two `/proc/stat` readings.
pub fn cpu_utilization(previous: &[CpuTimes], current: &[CpuTimes]) -> f64 {
    let (mut busy, mut total) = (0u64, 0u64);
    for (prev, cur) in previous.iter().zip(current) {
        let b = cur.busy.saturating_sub(prev.busy);
        let i = cur.idle.saturating_sub(prev.idle);
        busy += b;
        total += b + i;
    }
    if total == 0 {
        return 0.0;
    }
    100.0 * busy as f64 / total as f64
}

/// The 5-minute load average from `/proc/loadavg`.
pub fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().nth(1)?.parse().ok()
}

/// Resident set size and physical memory, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub resident_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryStats {
    pub fn resident_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        100.0 * self.resident_bytes as f64 / self.total_bytes as f64
    }
}

/// A `Key:   1234 kB` line from a `/proc` status file, in bytes.
fn parse_kb_field(text: &str, key: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.split(':').next() == Some(key))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// `VmRSS` from `/proc/self/status`.
pub fn parse_vm_rss(text: &str) -> Option<u64> {
    parse_kb_field(text, "VmRSS")
}

/// `MemTotal` from `/proc/meminfo`.
pub fn parse_mem_total(text: &str) -> Option<u64> {
    parse_kb_field(text, "MemTotal")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Sample {
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub interval_ms: u64,
    pub requests: u64,
    /// Mean request duration over the interval.
    pub latency_ms: f64,
    /// Bytes per millisecond over the interval.
    pub throughput: f64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
    pub load_average: f64,
}

impl Sample {
    pub fn compute(
        timestamp: i64,
        interval: Duration,
        totals: RequestTotals,
        cpu_percent: f64,
        memory: MemoryStats,
        load_average: f64,
    ) -> Self {
        let interval_ms = interval.as_millis() as u64;
        let latency_ms = if totals.requests == 0 {
            0.0
        } else {
            totals.elapsed_ms as f64 / totals.requests as f64
        };
        let throughput = if interval_ms == 0 {
            0.0
        } else {
            totals.bytes as f64 / interval_ms as f64
        };
        Self {
            timestamp,
            interval_ms,
            requests: totals.requests,
            latency_ms,
            throughput,
            cpu_percent,
            memory_bytes: memory.resident_bytes,
            memory_percent: memory.resident_percent(),
            load_average,
        }
    }

    pub fn metric_data(&self, dimensions: &[(String, String)]) -> Vec<MetricDatum> {
        let datum = |name: &str, unit: &'static str, value: f64| MetricDatum {
            name: name.to_string(),
            dimensions: dimensions.to_vec(),
            unit,
            value,
            timestamp: self.timestamp,
        };
        vec![
            datum("Latency", "Milliseconds", self.latency_ms),
            datum("Throughput", "Bytes/Millisecond", self.throughput),
            datum("CPUUtilization", "Percent", self.cpu_percent),
            datum("MemoryUtilization", "Bytes", self.memory_bytes as f64),
            datum("MemoryUtilizationPercent", "Percent", self.memory_percent),
            datum("LoadAverage", "Count", self.load_average),
        ]
    }
}

/// Latest sample, shared with the status endpoint.
pub type LatestSample = Arc<RwLock<Option<Sample>>>;

pub struct TelemetryLoop<S> {
    pub accumulator: Arc<RequestAccumulator>,
    pub sink: Arc<S>,
    pub namespace: String,
    pub dimensions: Vec<(String, String)>,
    pub interval: Duration,
    pub latest: LatestSample,
}

impl<S: MetricSink> TelemetryLoop<S> {
    /// Sample forever, once per interval.
    pub async fn run(self) {
        let mut previous_cpu = read_cpu_times().await;
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let totals = self.accumulator.take();
            let current_cpu = read_cpu_times().await;
            let cpu = cpu_utilization(&previous_cpu, &current_cpu);
            previous_cpu = current_cpu;
            let load = tokio::fs::read_to_string("/proc/loadavg")
                .await
                .ok()
                .and_then(|t| parse_loadavg(&t))
                .unwrap_or(0.0);

            let sample = Sample::compute(
                odrive_db::sql::now_millis(),
                self.interval,
                totals,
                cpu,
                read_memory().await,
                load,
            );
            let data = sample.metric_data(&self.dimensions);
            if let Ok(mut latest) = self.latest.write() {
                *latest = Some(sample);
            }
            if let Err(e) = self.sink.put_metric_data(&self.namespace, data).await {
                tracing::warn!(error = %e, "metric emission failed");
            }
        }
    }
}

/// Empty on systems without `/proc/stat`.
async fn read_cpu_times() -> Vec<CpuTimes> {
    match tokio::fs::read_to_string("/proc/stat").await {
        Ok(text) => parse_proc_stat(&text),
        Err(_) => Vec::new(),
    }
}

/// Zeroes where `/proc` is unavailable.
async fn read_memory() -> MemoryStats {
    let read = |path: &'static str| async move { tokio::fs::read_to_string(path).await.ok() };
    let resident_bytes = read("/proc/self/status")
        .await
        .and_then(|t| parse_vm_rss(&t))
        .unwrap_or(0);
    let total_bytes = read("/proc/meminfo")
        .await
        .and_then(|t| parse_mem_total(&t))
        .unwrap_or(0);
    MemoryStats {
        resident_bytes,
        total_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_T0: &str = "cpu  200 0 100 700 0 0 0 0 0 0
cpu0 100 0 50 350 0 0 0 0 0 0
cpu1 100 0 50 350 0 0 0 0 0 0
intr 12345
";

    const STAT_T1: &str = "cpu  400 0 200 1000 0 0 0 0 0 0
cpu0 200 0 100 400 0 0 0 0 0 0
cpu1 200 0 100 600 0 0 0 0 0 0
";

    #[test]
    fn test_accumulator_take_resets() {
        let acc = RequestAccumulator::new();
        acc.record(100, Duration::from_millis(10));
        acc.record(300, Duration::from_millis(30));
        assert_eq!(
            acc.take(),
            RequestTotals {
                requests: 2,
                bytes: 400,
                elapsed_ms: 40
            }
        );
        assert_eq!(acc.snapshot(), RequestTotals::default());
    }

    #[test]
    fn test_parse_proc_stat_skips_aggregate() {
        let cpus = parse_proc_stat(STAT_T0);
        assert_eq!(cpus.len(), 2);
        assert_eq!(cpus[0], CpuTimes { busy: 150, idle: 350 });
    }

    #[test]
    fn test_guest_time_not_double_counted() {
        let cpus = parse_proc_stat("cpu0 100 20 10 50 5 1 2 0 30 10\n");
        assert_eq!(cpus[0], CpuTimes { busy: 70 + 10 + 10 + 1 + 2, idle: 55 });
    }

    #[test]
    fn test_cpu_utilization_sums_deltas() {
        let cpu = cpu_utilization(&parse_proc_stat(STAT_T0), &parse_proc_stat(STAT_T1));
        // busy deltas 150 + 150, idle deltas 50 + 250
        assert!((cpu - 50.0).abs() < 1e-9);
        assert_eq!(cpu_utilization(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n"), Some(0.58));
        assert_eq!(parse_loadavg(""), None);
    }

    #[test]
    fn test_parse_memory_fields() {
        let status = "Name:\todrive\nVmPeak:\t  20000 kB\nVmRSS:\t   1024 kB\nThreads:\t8\n";
        assert_eq!(parse_vm_rss(status), Some(1024 * 1024));
        let meminfo = "MemTotal:        4096 kB\nMemFree:         2048 kB\n";
        assert_eq!(parse_mem_total(meminfo), Some(4096 * 1024));
        assert_eq!(parse_vm_rss(meminfo), None);
        assert_eq!(parse_mem_total("MemTotal: lots kB\n"), None);

        let stats = MemoryStats {
            resident_bytes: 1024,
            total_bytes: 4096,
        };
        assert!((stats.resident_percent() - 25.0).abs() < 1e-9);
        assert_eq!(MemoryStats::default().resident_percent(), 0.0);
    }

    #[test]
    fn test_sample_compute() {
        let sample = Sample::compute(
            1_000,
            Duration::from_secs(60),
            RequestTotals {
                requests: 4,
                bytes: 120_000,
                elapsed_ms: 200,
            },
            12.5,
            MemoryStats {
                resident_bytes: 50,
                total_bytes: 200,
            },
            0.58,
        );
        assert!((sample.latency_ms - 50.0).abs() < 1e-9);
        assert!((sample.throughput - 2.0).abs() < 1e-9);
        assert!((sample.memory_percent - 25.0).abs() < 1e-9);

        let data = sample.metric_data(&[("InstanceId".into(), "i-1".into())]);
        assert_eq!(data.len(), 6);
        assert!(data.iter().all(|d| d.timestamp == 1_000));
        assert_eq!(data[0].name, "Latency");
    }

    #[test]
    fn test_idle_interval_has_zero_latency() {
        let sample = Sample::compute(
            0,
            Duration::from_secs(60),
            RequestTotals::default(),
            0.0,
            MemoryStats::default(),
            0.0,
        );
        assert_eq!(sample.latency_ms, 0.0);
        assert_eq!(sample.throughput, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_publishes_latest_sample() {
        let latest = LatestSample::default();
        let accumulator = Arc::new(RequestAccumulator::new());
        accumulator.record(600, Duration::from_millis(5));
        let worker = TelemetryLoop {
            accumulator: accumulator.clone(),
            sink: Arc::new(crate::aws::LogMetricSink),
            namespace: "ObjectDrive".into(),
            dimensions: Vec::new(),
            interval: Duration::from_secs(60),
            latest: latest.clone(),
        };
        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_secs(90)).await;
        let sample = latest.read().expect("read").clone().expect("sample");
        assert_eq!(sample.requests, 1);
        assert_eq!(accumulator.snapshot().requests, 0);
        handle.abort();
    }
}
