//! Host health: CPU temperature, memory and root disk usage.

use serde::Serialize;
use serde_json::json;
use std::path::Path;
use sysinfo::{Components, Disks, System};

use crate::alerts::{AlertEvent, AlertKind, Severity};
use crate::config::HealthLimits;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub cpu_temp_c: Option<f32>,
    pub memory_used_pct: Option<f32>,
    pub disk_used_pct: Option<f32>,
    pub load_1m: f64,
    pub uptime_secs: u64,
}

pub struct HealthMonitor {
    sys: System,
    disks: Disks,
    components: Components,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn check(&mut self) -> HealthReport {
        self.sys.refresh_memory();
        self.disks.refresh();
        self.components.refresh();

        let memory_used_pct = percent(self.sys.used_memory(), self.sys.total_memory());

        let disk_used_pct = self
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .and_then(|d| percent(d.total_space().saturating_sub(d.available_space()), d.total_space()));

        let cpu_temp_c = self
            .components
            .iter()
            .find(|c| {
                let label = c.label().to_ascii_lowercase();
                label.contains("cpu") || label.contains("soc")
            })
            .map(|c| c.temperature())
            .filter(|t| t.is_finite() && *t > 0.0)
            .or_else(read_thermal_zone);

        HealthReport {
            cpu_temp_c,
            memory_used_pct,
            disk_used_pct,
            load_1m: System::load_average().one,
            uptime_secs: System::uptime(),
        }
    }
}

fn percent(used: u64, total: u64) -> Option<f32> {
    (total > 0).then(|| (used as f64 / total as f64 * 100.0) as f32)
}

/// Kernel thermal zones report millidegrees (45000 = 45.0°C).
pub(crate) fn parse_millidegrees(s: &str) -> Option<f32> {
    s.trim().parse::<f32>().ok().map(|t| t / 1000.0)
}

fn read_thermal_zone() -> Option<f32> {
    std::fs::read_to_string(THERMAL_ZONE)
        .ok()
        .and_then(|s| parse_millidegrees(&s))
}

/// Alerts for every limit the report exceeds. Unknown values raise nothing.
pub fn health_alerts(report: &HealthReport, limits: &HealthLimits, ts: i64) -> Vec<AlertEvent> {
    let mut out = Vec::new();

    if let Some(t) = report.cpu_temp_c {
        if t >= limits.cpu_temp_critical {
            out.push(AlertEvent::new(
                AlertKind::CpuTemperature,
                Severity::Critical,
                ts,
                json!({"value": t, "limit": limits.cpu_temp_critical}),
            ));
        } else if t >= limits.cpu_temp_warning {
            out.push(AlertEvent::new(
                AlertKind::CpuTemperature,
                Severity::Warning,
                ts,
                json!({"value": t, "limit": limits.cpu_temp_warning}),
            ));
        }
    }

    if let Some(m) = report.memory_used_pct.filter(|m| *m > limits.memory_warning_pct) {
        out.push(AlertEvent::new(
            AlertKind::MemoryUsage,
            Severity::Warning,
            ts,
            json!({"value": m, "limit": limits.memory_warning_pct}),
        ));
    }

    if let Some(d) = report.disk_used_pct.filter(|d| *d > limits.disk_warning_pct) {
        out.push(AlertEvent::new(
            AlertKind::DiskUsage,
            Severity::Warning,
            ts,
            json!({"value": d, "limit": limits.disk_warning_pct}),
        ));
    }

    out
}
