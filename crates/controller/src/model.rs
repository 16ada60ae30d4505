//! Per-iteration data shared between the sensor suite, evaluator, logger and
//! alerting.

use bloom_hardware::Power;
use serde::{Serialize, Serializer};

/// One sampling pass. `None` means the reading failed or the sensor is not
/// fitted; a failed reading is never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// Unix seconds.
    pub ts: i64,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    /// One entry per configured zone, in zone order.
    pub soil_moisture: Vec<Option<f32>>,
    pub light_level: Option<f32>,
    pub rain_detected: Option<bool>,
}

impl SensorSnapshot {
    /// A snapshot where nothing is known yet.
    pub fn unknown(ts: i64, zones: usize) -> Self {
        Self {
            ts,
            temperature: None,
            humidity: None,
            soil_moisture: vec![None; zones],
            light_level: None,
            rain_detected: None,
        }
    }

    /// Mean over zones with a valid reading; `None` when every zone is unknown.
    pub fn mean_soil_moisture(&self) -> Option<f32> {
        let known: Vec<f32> = self.soil_moisture.iter().flatten().copied().collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f32>() / known.len() as f32)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shelter {
    Open,
    Closed,
}

impl std::fmt::Display for Shelter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The one current value of every actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    #[serde(serialize_with = "power_str")]
    pub pump: Power,
    #[serde(serialize_with = "power_str")]
    pub fan: Power,
    #[serde(serialize_with = "power_str")]
    pub lamp: Power,
    pub shelter: Shelter,
}

impl ActuatorState {
    /// Pump, fan and lamp off; shelter open.
    pub const SAFE: Self = Self {
        pump: Power::Off,
        fan: Power::Off,
        lamp: Power::Off,
        shelter: Shelter::Open,
    };
}

fn power_str<S: Serializer>(p: &Power, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(if p.is_on() { "on" } else { "off" })
}
