use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use crate::config::Mode;
use crate::model::{ActuatorState, SensorSnapshot};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub farm_name: String,
    pub mode: Mode,
    pub latest: Option<SensorSnapshot>,
    pub actuators: ActuatorState,
    pub loop_count: u64,
    pub error_count: u64,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub ts: i64,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Actuator,
    Alert,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON status (what the status file contains)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse<'a> {
    pub farm_name: &'a str,
    pub mode: String,
    pub uptime_secs: u64,
    pub loop_count: u64,
    pub error_count: u64,
    pub latest: Option<&'a SensorSnapshot>,
    pub actuators: ActuatorState,
    /// Newest first.
    pub events: Vec<&'a SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(farm_name: &str, mode: Mode) -> Self {
        Self {
            started_at: Instant::now(),
            farm_name: farm_name.to_string(),
            mode,
            latest: None,
            actuators: ActuatorState::SAFE,
            loop_count: 0,
            error_count: 0,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a completed control iteration.
    pub fn record_iteration(&mut self, snapshot: SensorSnapshot, actuators: ActuatorState) {
        if actuators != self.actuators {
            let detail = format!(
                "pump={} fan={} lamp={} shelter={}",
                actuators.pump, actuators.fan, actuators.lamp, actuators.shelter
            );
            self.push_event(snapshot.ts, EventKind::Actuator, detail);
        }
        self.actuators = actuators;
        self.latest = Some(snapshot);
        self.loop_count += 1;
    }

    pub fn record_alert(&mut self, ts: i64, detail: String) {
        self.push_event(ts, EventKind::Alert, detail);
    }

    /// Record an error event and bump the error counter.
    pub fn record_error(&mut self, ts: i64, detail: String) {
        self.error_count += 1;
        self.push_event(ts, EventKind::Error, detail);
    }

    pub fn record_system(&mut self, ts: i64, detail: String) {
        self.push_event(ts, EventKind::System, detail);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn to_status(&self) -> StatusResponse<'_> {
        StatusResponse {
            farm_name: &self.farm_name,
            mode: self.mode.to_string(),
            uptime_secs: self.uptime_secs(),
            loop_count: self.loop_count,
            error_count: self.error_count,
            latest: self.latest.as_ref(),
            actuators: self.actuators,
            events: self.events.iter().rev().collect(),
        }
    }

    /// Write the status JSON via a temp file and rename, so readers never
    /// see a partial file.
    pub fn write_status_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.to_status()).context("encode status")?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(())
    }

    fn push_event(&mut self, ts: i64, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent { ts, kind, detail });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
