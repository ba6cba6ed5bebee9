use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};
use tracing::trace;

/// One measurement. A `None` metric is sent as "not measured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    pub cpu_usage: Option<u8>,
    pub memory_usage: Option<u8>,
    pub process_count: Option<u32>,
}

pub trait SystemMetrics {
    fn sample(&mut self) -> Sample;
}

/// Metrics of the machine the agent runs on.
///
/// CPU usage is measured between two consecutive samples, so the first
/// sample after construction covers the time since [`PlatformSystemMetrics::new`].
pub struct PlatformSystemMetrics {
    system: System,
}

impl Default for PlatformSystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformSystemMetrics {
    pub fn new() -> PlatformSystemMetrics {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self { system }
    }
}

impl SystemMetrics for PlatformSystemMetrics {
    fn sample(&mut self) -> Sample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let cpu_usage = self.system.global_cpu_usage();
        let total_memory = self.system.total_memory();
        let used_memory = self.system.used_memory();

        trace!(
            "cpu {cpu_usage:.1}%, memory {used_memory}/{total_memory} bytes, {} processes",
            self.system.processes().len()
        );

        Sample {
            cpu_usage: cpu_usage
                .is_finite()
                .then(|| percentage(f64::from(cpu_usage))),
            memory_usage: (total_memory > 0)
                .then(|| percentage(used_memory as f64 * 100.0 / total_memory as f64)),
            process_count: u32::try_from(self.system.processes().len()).ok(),
        }
    }
}

fn percentage(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Always reports the same sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSystemMetrics(pub Sample);

impl SystemMetrics for FixedSystemMetrics {
    fn sample(&mut self) -> Sample {
        self.0
    }
}
