use std::fmt;

use tracing::{info, instrument};

use crate::{config::Limits, storage::MonitoringRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    CpuUsage,
    MemoryUsage,
    ProcessCount,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::CpuUsage => "CPU Usage",
            Metric::MemoryUsage => "Memory Usage",
            Metric::ProcessCount => "Process Count",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Metric::CpuUsage | Metric::MemoryUsage => "%",
            Metric::ProcessCount => "",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A metric that went above its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitBreach {
    pub metric: Metric,
    pub value: u32,
    pub limit: u32,
}

impl LimitBreach {
    /// Fill `{metric}`, `{value}` and `{limit}` in `template`.
    pub fn render(&self, template: &str) -> String {
        let unit = self.metric.unit();
        template
            .replace("{metric}", self.metric.label())
            .replace("{value}", &format!("{}{unit}", self.value))
            .replace("{limit}", &format!("{}{unit}", self.limit))
    }
}

/// Breaches of one record, always in the order CPU, memory, process count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitReport {
    breaches: Vec<LimitBreach>,
}

impl LimitReport {
    pub fn is_empty(&self) -> bool {
        self.breaches.is_empty()
    }

    pub fn breaches(&self) -> &[LimitBreach] {
        &self.breaches
    }

    /// One rendered line per breach, each terminated by a newline.
    pub fn render(&self, line_template: &str) -> String {
        self.breaches
            .iter()
            .map(|breach| breach.render(line_template) + "\n")
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LimitMonitor {
    limits: Limits,
}

impl LimitMonitor {
    pub fn new(limits: Limits) -> LimitMonitor {
        Self { limits }
    }

    /// Compare every present metric of `record` against its limit. A value
    /// equal to the limit is fine.
    #[instrument(skip_all)]
    pub fn evaluate(&self, record: &MonitoringRecord) -> LimitReport {
        let Limits {
            cpu,
            memory,
            processes,
        } = self.limits;

        let candidates = [
            (Metric::CpuUsage, record.cpu_usage.map(u32::from), u32::from(cpu)),
            (Metric::MemoryUsage, record.memory_usage.map(u32::from), u32::from(memory)),
            (Metric::ProcessCount, record.process_count, processes),
        ];

        let breaches = candidates
            .into_iter()
            .filter_map(|(metric, value, limit)| {
                let value = value.filter(|&value| value > limit)?;
                info!(
                    "user '{}' exceeds {} limit: {value}/{limit}",
                    record.user_key,
                    metric.label().to_lowercase()
                );
                Some(LimitBreach {
                    metric,
                    value,
                    limit,
                })
            })
            .collect();

        LimitReport { breaches }
    }
}

/// Fill `{user_key}` and `{limits}` in the notification body template.
pub fn render_notification(body_template: &str, user_key: &str, limits: &str) -> String {
    body_template
        .replace("{user_key}", user_key)
        .replace("{limits}", limits)
}
