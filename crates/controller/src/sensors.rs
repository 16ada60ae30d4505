//! One sampling pass over every fitted sensor, and consecutive-failure
//! tracking per sensor.

use bloom_hardware::sensor::{ClimateSensor, PercentSensor, SwitchSensor};
use bloom_hardware::{Sensor, SensorError};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::model::SensorSnapshot;

// ---------------------------------------------------------------------------
// Sensor suite
// ---------------------------------------------------------------------------

/// Result of reading one sensor during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub sensor: String,
    pub error: Option<SensorError>,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub snapshot: SensorSnapshot,
    pub outcomes: Vec<ReadOutcome>,
}

impl Sample {
    pub fn failures(&self) -> impl Iterator<Item = &SensorError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref())
    }
}

#[derive(Default)]
pub struct SensorSuite {
    climate: Option<ClimateSensor>,
    soil: Vec<PercentSensor>,
    light: Option<PercentSensor>,
    rain: Option<SwitchSensor>,
}

impl SensorSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_climate(mut self, s: ClimateSensor) -> Self {
        self.climate = Some(s);
        self
    }

    /// Soil zones are numbered in the order they are added.
    pub fn with_soil(mut self, s: PercentSensor) -> Self {
        self.soil.push(s);
        self
    }

    pub fn with_light(mut self, s: PercentSensor) -> Self {
        self.light = Some(s);
        self
    }

    pub fn with_rain(mut self, s: SwitchSensor) -> Self {
        self.rain = Some(s);
        self
    }

    pub fn zone_count(&self) -> usize {
        self.soil.len()
    }

    /// Read every sensor once. A failed read leaves its field `None` and is
    /// reported in `outcomes`; it never aborts the pass.
    pub fn sample(&mut self, ts: i64) -> Sample {
        let mut snapshot = SensorSnapshot::unknown(ts, self.soil.len());
        let mut outcomes = Vec::new();

        if let Some(s) = self.climate.as_mut() {
            if let Some(r) = read_one(s.as_mut(), &mut outcomes) {
                snapshot.temperature = Some(r.temperature_c);
                snapshot.humidity = Some(r.humidity_pct);
            }
        }

        for (zone, s) in self.soil.iter_mut().enumerate() {
            snapshot.soil_moisture[zone] = read_one(s.as_mut(), &mut outcomes);
        }

        if let Some(s) = self.light.as_mut() {
            snapshot.light_level = read_one(s.as_mut(), &mut outcomes);
        }

        if let Some(s) = self.rain.as_mut() {
            snapshot.rain_detected = read_one(s.as_mut(), &mut outcomes);
        }

        Sample { snapshot, outcomes }
    }
}

fn read_one<S>(sensor: &mut S, outcomes: &mut Vec<ReadOutcome>) -> Option<S::Reading>
where
    S: Sensor + ?Sized,
{
    let name = sensor.name().to_string();
    match sensor.read() {
        Ok(v) => {
            outcomes.push(ReadOutcome {
                sensor: name,
                error: None,
            });
            Some(v)
        }
        Err(e) => {
            warn!(sensor = %name, error = %e, "sensor read failed");
            outcomes.push(ReadOutcome {
                sensor: name,
                error: Some(e),
            });
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Fault tracking
// ---------------------------------------------------------------------------

/// A sensor whose failure streak just reached the alert threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFault {
    pub sensor: String,
    pub streak: u32,
    pub error: SensorError,
}

/// Counts consecutive failed reads per sensor. Reports a fault exactly once
/// per streak, when it reaches `threshold`; a successful read resets it.
pub struct FaultTracker {
    threshold: u32,
    streaks: HashMap<String, u32>,
}

impl FaultTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streaks: HashMap::new(),
        }
    }

    pub fn observe(&mut self, outcomes: &[ReadOutcome]) -> Vec<SensorFault> {
        let mut faults = Vec::new();
        for o in outcomes {
            let streak = self.streaks.entry(o.sensor.clone()).or_insert(0);
            match &o.error {
                None => {
                    if *streak >= self.threshold {
                        info!(sensor = %o.sensor, failed_reads = *streak, "sensor recovered");
                    }
                    *streak = 0;
                }
                Some(e) => {
                    *streak += 1;
                    if *streak == self.threshold {
                        faults.push(SensorFault {
                            sensor: o.sensor.clone(),
                            streak: *streak,
                            error: e.clone(),
                        });
                    }
                }
            }
        }
        faults
    }

    #[cfg(test)]
    pub fn streak(&self, sensor: &str) -> u32 {
        self.streaks.get(sensor).copied().unwrap_or(0)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
