//! Alert detection and dispatch.
//!
//! Detection functions turn a snapshot (or host health, or a control-loop
//! event) into [`AlertEvent`]s. The [`AlertDispatcher`] fans each event out
//! to its sinks once, applying a per-kind cooldown to Warning and Critical
//! alerts. There is no retry queue: a failed delivery is reported to the
//! caller and the event is gone.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ThresholdConfig;
use crate::model::SensorSnapshot;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TemperatureHigh,
    TemperatureLow,
    HumidityHigh,
    HumidityLow,
    SoilDryRainBlocked,
    RainStarted,
    SensorFault,
    ActuatorFault,
    IrrigationStarted,
    IrrigationStopped,
    IrrigationCutoff,
    CpuTemperature,
    MemoryUsage,
    DiskUsage,
    Startup,
    Shutdown,
    DailyReport,
}

impl AlertKind {
    /// Stable identifier, used as the MQTT topic suffix and DB value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureHigh => "temperature_high",
            Self::TemperatureLow => "temperature_low",
            Self::HumidityHigh => "humidity_high",
            Self::HumidityLow => "humidity_low",
            Self::SoilDryRainBlocked => "soil_dry_rain_blocked",
            Self::RainStarted => "rain_started",
            Self::SensorFault => "sensor_fault",
            Self::ActuatorFault => "actuator_fault",
            Self::IrrigationStarted => "irrigation_started",
            Self::IrrigationStopped => "irrigation_stopped",
            Self::IrrigationCutoff => "irrigation_cutoff",
            Self::CpuTemperature => "cpu_temperature",
            Self::MemoryUsage => "memory_usage",
            Self::DiskUsage => "disk_usage",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::DailyReport => "daily_report",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub severity: Severity,
    /// Unix seconds.
    pub ts: i64,
    /// Device the alert concerns, if any. Part of the cooldown key so one
    /// failing sensor does not mask another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub payload: Value,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, severity: Severity, ts: i64, payload: Value) -> Self {
        Self {
            kind,
            severity,
            ts,
            subject: None,
            payload,
        }
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// One-line human readable summary.
    pub fn message(&self) -> String {
        let p = &self.payload;
        let num = |key: &str| p.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
        let subject = self.subject.as_deref().unwrap_or("?");
        match self.kind {
            AlertKind::TemperatureHigh => format!(
                "temperature {:.1}°C above {:.1}°C",
                num("value"),
                num("limit")
            ),
            AlertKind::TemperatureLow => format!(
                "temperature {:.1}°C below {:.1}°C",
                num("value"),
                num("limit")
            ),
            AlertKind::HumidityHigh => {
                format!("humidity {:.0}% above {:.0}%", num("value"), num("limit"))
            }
            AlertKind::HumidityLow => {
                format!("humidity {:.0}% below {:.0}%", num("value"), num("limit"))
            }
            AlertKind::SoilDryRainBlocked => format!(
                "soil moisture {:.0}% is low but irrigation is held for rain",
                num("moisture")
            ),
            AlertKind::RainStarted => "rain detected, shelter closing".to_string(),
            AlertKind::SensorFault => format!(
                "sensor {subject} failed {} reads in a row: {}",
                num("streak"),
                p.get("error").and_then(Value::as_str).unwrap_or("unknown error")
            ),
            AlertKind::ActuatorFault => format!(
                "actuator {subject} fault: {}",
                p.get("error").and_then(Value::as_str).unwrap_or("unknown error")
            ),
            AlertKind::IrrigationStarted => format!(
                "irrigation started at {:.0}% soil moisture",
                num("moisture")
            ),
            AlertKind::IrrigationStopped => {
                format!("irrigation stopped after {}s", num("duration_secs"))
            }
            AlertKind::IrrigationCutoff => format!(
                "pump forced off after {}s, resting {}s",
                num("duration_secs"),
                num("rest_secs")
            ),
            AlertKind::CpuTemperature => {
                format!("CPU temperature {:.1}°C (limit {:.1}°C)", num("value"), num("limit"))
            }
            AlertKind::MemoryUsage => {
                format!("memory usage {:.0}% (limit {:.0}%)", num("value"), num("limit"))
            }
            AlertKind::DiskUsage => {
                format!("disk usage {:.0}% (limit {:.0}%)", num("value"), num("limit"))
            }
            AlertKind::Startup => format!(
                "{} controller started",
                p.get("farm").and_then(Value::as_str).unwrap_or("farm")
            ),
            AlertKind::Shutdown => format!(
                "controller stopping after {} loops",
                num("loops")
            ),
            AlertKind::DailyReport => format!(
                "daily report: avg temp {}, avg soil {}, {} irrigation runs, {} alerts",
                fmt_opt(p.get("avg_temperature")),
                fmt_opt(p.get("avg_soil_moisture")),
                num("irrigation_runs"),
                num("alerts")
            ),
        }
    }
}

fn fmt_opt(v: Option<&Value>) -> String {
    match v.and_then(Value::as_f64) {
        Some(x) => format!("{x:.1}"),
        None => "n/a".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Environmental alerts for one snapshot. `last_rain` is the last *known*
/// rain state, so rain onset fires once per spell even across failed reads.
pub fn detect_alerts(
    snapshot: &SensorSnapshot,
    last_rain: Option<bool>,
    t: &ThresholdConfig,
) -> Vec<AlertEvent> {
    let ts = snapshot.ts;
    let mut out = Vec::new();

    let bound = |kind, value: f32, limit: f32| {
        AlertEvent::new(kind, Severity::Warning, ts, json!({"value": value, "limit": limit}))
    };

    if let Some(temp) = snapshot.temperature {
        if temp > t.temperature_max {
            out.push(bound(AlertKind::TemperatureHigh, temp, t.temperature_max));
        } else if temp < t.temperature_min {
            out.push(bound(AlertKind::TemperatureLow, temp, t.temperature_min));
        }
    }

    if let Some(hum) = snapshot.humidity {
        if hum > t.humidity_max {
            out.push(bound(AlertKind::HumidityHigh, hum, t.humidity_max));
        } else if hum < t.humidity_min {
            out.push(bound(AlertKind::HumidityLow, hum, t.humidity_min));
        }
    }

    if snapshot.rain_detected == Some(true) {
        if let Some(m) = snapshot.mean_soil_moisture().filter(|m| *m < t.soil_low) {
            out.push(AlertEvent::new(
                AlertKind::SoilDryRainBlocked,
                Severity::Warning,
                ts,
                json!({"moisture": m, "limit": t.soil_low}),
            ));
        }
        if last_rain != Some(true) {
            out.push(AlertEvent::new(AlertKind::RainStarted, Severity::Info, ts, json!({})));
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{sink}: delivery failed: {detail}")]
    Sink { sink: String, detail: String },

    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no alert sinks configured")]
    NoSinks,
}

/// One delivery channel. A single attempt per call; no retries.
pub trait Notifier: Send {
    fn name(&self) -> &str;

    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError>;
}

/// Writes alerts to the tracing log at a level matching their severity.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        let kind = event.kind.as_str();
        let msg = event.message();
        match event.severity {
            Severity::Info => info!(alert = kind, "{msg}"),
            Severity::Warning => warn!(alert = kind, "{msg}"),
            Severity::Critical => error!(alert = kind, "{msg}"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Same kind delivered within the cooldown window.
    Suppressed,
}

type CooldownKey = (AlertKind, Option<String>);

pub struct AlertDispatcher {
    sinks: Vec<Box<dyn Notifier>>,
    cooldown: Duration,
    /// Unix seconds of the last delivery per key.
    last_sent: HashMap<CooldownKey, i64>,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            cooldown,
            last_sent: HashMap::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Deliver to every sink once. Succeeds if at least one sink accepted the
    /// event; only then does the cooldown window start. The window is timed
    /// on `event.ts`, so it follows whatever clock stamped the event.
    pub fn notify(&mut self, event: &AlertEvent) -> Result<Delivery, DispatchError> {
        let key = (event.kind, event.subject.clone());
        let throttled = event.severity >= Severity::Warning;

        if throttled {
            if let Some(prev) = self.last_sent.get(&key) {
                let elapsed = event.ts.saturating_sub(*prev);
                if (0..self.cooldown.as_secs() as i64).contains(&elapsed) {
                    return Ok(Delivery::Suppressed);
                }
            }
        }

        let mut delivered = 0usize;
        let mut last_err = None;
        for sink in &mut self.sinks {
            match sink.notify(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(sink = sink.name(), alert = event.kind.as_str(), error = %e, "alert sink failed");
                    last_err = Some(e);
                }
            }
        }

        if delivered == 0 {
            return Err(last_err.unwrap_or(DispatchError::NoSinks));
        }
        if throttled {
            self.last_sent.insert(key, event.ts);
        }
        Ok(Delivery::Sent)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
