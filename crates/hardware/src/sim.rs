//! Stateful field simulator for running the controller off-hardware.
//!
//! One [`SimField`] models a small plot:
//! - Soil zones as a random walk with mean reversion and drying drift
//! - Per-reading ADC noise and occasional spikes
//! - Day/night cycle for temperature, humidity and light
//! - Rain spells that start and stop at random
//! - Closed-loop response: soil gets wetter while the pump line is energised
//! - Optional injected read faults
//!
//! The `Sim*` readers share the field through `Arc<Mutex<_>>` and implement
//! [`Sensor`] exactly like the real drivers.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::calibration::{Calibration, ADC_MAX};
use crate::error::SensorError;
use crate::sensor::{ClimateReading, Sensor};

// ---------------------------------------------------------------------------
// Gaussian approximation
// ---------------------------------------------------------------------------

/// Irwin-Hall: sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles, selectable via the `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Warm day, soil starts mid-range and dries. Occasional showers.
    Drying,
    /// Mild weather, soil hovers near the centre, no rain.
    Stable,
    /// Noisy probes, frequent spikes, some rain.
    Flaky,
    /// Cool and damp, soil starts near the wet end, frequent rain.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field state
// ---------------------------------------------------------------------------

struct Zone {
    /// "True" moisture in ADC units. Evolves on every read of this zone.
    base: f64,
    /// Permanent calibration offset; two probes in the same bed disagree.
    offset: f64,
    noise_sigma: f64,
}

pub type SharedField = Arc<Mutex<SimField>>;

pub struct SimField {
    zones: Vec<Zone>,

    raw_dry: f64,
    raw_wet: f64,

    // Random walk
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    center: f64,

    // Spikes
    spike_prob: f32,
    spike_sigma: f64,

    // Weather
    mean_temp_c: f64,
    diurnal_period_s: f64,
    rain_start_prob: f32,
    rain_stop_prob: f32,
    raining: bool,

    // Watering response
    pump_line: Option<Arc<AtomicBool>>,
    wet_rate: f64,

    fault_rate: f32,
}

impl SimField {
    /// `raw_dry` / `raw_wet` should match the soil calibration in
    /// `config.toml` (700 / 300 for the stock capacitive probes).
    ///
    /// `diurnal_period_s` sets the day length: 600 for fast dev iteration,
    /// 86400 for real time.
    pub fn new(
        scenario: Scenario,
        zone_count: usize,
        raw_dry: f64,
        raw_wet: f64,
        diurnal_period_s: f64,
    ) -> Self {
        let range = (raw_dry - raw_wet).abs().max(1.0);
        let center = (raw_dry + raw_wet) / 2.0;

        // Fractions of the calibrated range per sample.
        let (drift, walk, noise, spike_prob, spike, start_frac, temp, rain_start) = match scenario {
            // start_frac: 0.0 = at raw_wet (wettest), 1.0 = at raw_dry (driest)
            Scenario::Drying => (0.0011, 0.011, 0.006, 0.03_f32, 0.14, 0.5, 27.0, 0.005_f32),
            Scenario::Stable => (0.0002, 0.004, 0.003, 0.005, 0.07, 0.5, 22.0, 0.0),
            Scenario::Flaky => (0.0007, 0.018, 0.014, 0.10, 0.21, 0.5, 24.0, 0.02),
            Scenario::Wet => (0.0002, 0.006, 0.004, 0.02, 0.11, 0.2, 16.0, 0.05),
        };

        let start_base = raw_wet + start_frac * (raw_dry - raw_wet);
        let (lo, hi) = (raw_dry.min(raw_wet), raw_dry.max(raw_wet));

        let zones = (0..zone_count)
            .map(|_| Zone {
                base: (start_base + gaussian(0.0, range * 0.03)).clamp(lo, hi),
                offset: gaussian(0.0, range * 0.02),
                noise_sigma: range * noise * (1.0 + 0.2 * approx_std_normal()).max(0.3),
            })
            .collect();

        let toward_dry = (raw_dry - raw_wet).signum();

        Self {
            zones,
            raw_dry,
            raw_wet,
            drift_per_sample: range * drift * toward_dry,
            walk_sigma: range * walk,
            mean_reversion: 0.02,
            center,
            spike_prob,
            spike_sigma: range * spike,
            mean_temp_c: temp,
            diurnal_period_s: diurnal_period_s.max(1.0),
            rain_start_prob: rain_start,
            rain_stop_prob: 0.08,
            raining: false,
            pump_line: None,
            wet_rate: -range * 0.02 * toward_dry,
            fault_rate: 0.0,
        }
    }

    /// Couple soil moisture to a pump relay line.
    pub fn with_pump_line(mut self, line: Arc<AtomicBool>) -> Self {
        self.pump_line = Some(line);
        self
    }

    /// Probability (0..=1) that any single read fails with a timeout.
    pub fn with_fault_rate(mut self, rate: f32) -> Self {
        self.fault_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn shared(self) -> SharedField {
        Arc::new(Mutex::new(self))
    }

    fn watering(&self) -> bool {
        self.pump_line
            .as_ref()
            .is_some_and(|l| l.load(Ordering::SeqCst))
    }

    fn maybe_fault(&self, sensor: &str) -> Result<(), SensorError> {
        if self.fault_rate > 0.0 && fastrand::f32() < self.fault_rate {
            return Err(SensorError::Timeout {
                sensor: sensor.to_string(),
                stage: "simulated response",
            });
        }
        Ok(())
    }

    /// Day phase in radians; sin() peaks mid-afternoon.
    fn phase(&self) -> f64 {
        let now_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        2.0 * std::f64::consts::PI * now_s / self.diurnal_period_s
    }

    /// Next raw ADC reading for soil zone `index`.
    pub fn sample_soil(&mut self, index: usize) -> Option<u16> {
        let watering = self.watering();
        let raining = self.raining;
        let (lo, hi) = (self.raw_dry.min(self.raw_wet), self.raw_dry.max(self.raw_wet));
        let margin = (hi - lo) * 0.1;

        let zone = self.zones.get_mut(index)?;

        let pull = self.mean_reversion * (self.center - zone.base);
        let walk = gaussian(0.0, self.walk_sigma);
        let wet = match (watering, raining) {
            (true, _) => self.wet_rate,
            (false, true) => self.wet_rate * 0.5,
            _ => 0.0,
        };
        zone.base = (zone.base + self.drift_per_sample + pull + walk + wet)
            .clamp(lo - margin, hi + margin);

        let noise = gaussian(0.0, zone.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };

        let reading = zone.base + zone.offset + noise + spike;
        Some(reading.round().clamp(0.0, ADC_MAX as f64) as u16)
    }

    pub fn sample_climate(&mut self) -> ClimateReading {
        let day = self.phase().sin();
        let temperature = self.mean_temp_c + 6.0 * day + gaussian(0.0, 0.3)
            - if self.raining { 3.0 } else { 0.0 };
        let humidity = 60.0 - 15.0 * day + gaussian(0.0, 1.0)
            + if self.raining { 25.0 } else { 0.0 };
        ClimateReading {
            temperature_c: temperature.clamp(-40.0, 80.0) as f32,
            humidity_pct: humidity.clamp(0.0, 100.0) as f32,
        }
    }

    /// Raw LDR reading: dark at night, dimmed by rain.
    pub fn sample_light(&mut self) -> u16 {
        let mut level = self.phase().sin().max(0.0) * 0.9 + gaussian(0.0, 0.01);
        if self.raining {
            level *= 0.4;
        }
        (level.clamp(0.0, 1.0) * ADC_MAX as f64).round() as u16
    }

    /// Advance the rain spell model and report whether it is raining.
    pub fn sample_rain(&mut self) -> bool {
        let roll = fastrand::f32();
        if self.raining {
            if roll < self.rain_stop_prob {
                self.raining = false;
            }
        } else if roll < self.rain_start_prob {
            self.raining = true;
        }
        self.raining
    }
}

fn lock<'a>(field: &'a SharedField, sensor: &str) -> Result<std::sync::MutexGuard<'a, SimField>, SensorError> {
    field
        .lock()
        .map_err(|_| SensorError::unavailable(sensor, "simulator state poisoned"))
}

// ---------------------------------------------------------------------------
// Simulated readers
// ---------------------------------------------------------------------------

pub struct SimClimate {
    name: String,
    field: SharedField,
}

impl SimClimate {
    pub fn new(name: &str, field: SharedField) -> Self {
        Self {
            name: name.to_string(),
            field,
        }
    }
}

impl Sensor for SimClimate {
    type Reading = ClimateReading;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<ClimateReading, SensorError> {
        let mut field = lock(&self.field, &self.name)?;
        field.maybe_fault(&self.name)?;
        Ok(field.sample_climate())
    }
}

pub struct SimSoil {
    name: String,
    field: SharedField,
    zone: usize,
    calibration: Calibration,
}

impl SimSoil {
    pub fn new(name: &str, field: SharedField, zone: usize, calibration: Calibration) -> Self {
        Self {
            name: name.to_string(),
            field,
            zone,
            calibration,
        }
    }
}

impl Sensor for SimSoil {
    type Reading = f32;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        let mut field = lock(&self.field, &self.name)?;
        field.maybe_fault(&self.name)?;
        let raw = field
            .sample_soil(self.zone)
            .ok_or_else(|| SensorError::unavailable(&self.name, format!("no zone {}", self.zone)))?;
        Ok(self.calibration.percent(raw))
    }
}

pub struct SimLight {
    name: String,
    field: SharedField,
}

impl SimLight {
    pub fn new(name: &str, field: SharedField) -> Self {
        Self {
            name: name.to_string(),
            field,
        }
    }
}

impl Sensor for SimLight {
    type Reading = f32;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        let mut field = lock(&self.field, &self.name)?;
        field.maybe_fault(&self.name)?;
        Ok(Calibration::full_scale().percent(field.sample_light()))
    }
}

pub struct SimRain {
    name: String,
    field: SharedField,
}

impl SimRain {
    pub fn new(name: &str, field: SharedField) -> Self {
        Self {
            name: name.to_string(),
            field,
        }
    }
}

impl Sensor for SimRain {
    type Reading = bool;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<bool, SensorError> {
        let mut field = lock(&self.field, &self.name)?;
        field.maybe_fault(&self.name)?;
        Ok(field.sample_rain())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn field(scenario: Scenario, zones: usize) -> SimField {
        SimField::new(scenario, zones, 700.0, 300.0, 600.0)
    }

    fn mean_soil(sim: &mut SimField, n: usize) -> f64 {
        (0..n).map(|_| sim.sample_soil(0).unwrap() as f64).sum::<f64>() / n as f64
    }

    #[test]
    fn soil_readings_within_adc_range() {
        let mut sim = field(Scenario::Flaky, 2);
        for _ in 0..500 {
            for i in 0..2 {
                let v = sim.sample_soil(i).unwrap();
                assert!(v <= ADC_MAX, "ADC out of range: {v}");
            }
        }
    }

    #[test]
    fn unknown_zone_is_none() {
        let mut sim = field(Scenario::Stable, 1);
        assert!(sim.sample_soil(3).is_none());
    }

    #[test]
    fn temporal_coherence() {
        let mut sim = field(Scenario::Stable, 1);
        let samples: Vec<i32> = (0..100).map(|_| sim.sample_soil(0).unwrap() as i32).collect();
        let max_jump = samples.windows(2).map(|w| (w[1] - w[0]).abs()).max().unwrap();
        // Full calibrated range is 400; allow for rare spikes.
        assert!(max_jump < 150, "max consecutive jump too large: {max_jump}");
    }

    #[test]
    fn pump_line_wets_the_soil() {
        let line = Arc::new(AtomicBool::new(false));
        let mut sim = field(Scenario::Drying, 1).with_pump_line(Arc::clone(&line));

        for _ in 0..20 {
            sim.sample_soil(0);
        }
        let before = mean_soil(&mut sim, 20);

        line.store(true, Ordering::SeqCst);
        for _ in 0..50 {
            sim.sample_soil(0);
        }
        let after = mean_soil(&mut sim, 20);

        // Wetter = lower raw value for a capacitive probe.
        assert!(after < before, "watering should lower readings: before={before:.0} after={after:.0}");
    }

    #[test]
    fn wet_scenario_starts_below_midpoint() {
        let mut sim = field(Scenario::Wet, 1);
        let avg = mean_soil(&mut sim, 10);
        assert!(avg < 500.0, "wet scenario should start near raw_wet: avg={avg:.0}");
    }

    #[test]
    fn stable_scenario_never_rains() {
        let mut sim = field(Scenario::Stable, 1);
        assert!((0..500).all(|_| !sim.sample_rain()));
    }

    #[test]
    fn wet_scenario_rains_eventually() {
        let mut sim = field(Scenario::Wet, 1);
        assert!((0..2000).any(|_| sim.sample_rain()));
    }

    #[test]
    fn climate_values_are_plausible() {
        let mut sim = field(Scenario::Drying, 1);
        for _ in 0..200 {
            let r = sim.sample_climate();
            assert!((-40.0..=80.0).contains(&r.temperature_c));
            assert!((0.0..=100.0).contains(&r.humidity_pct));
        }
    }

    #[test]
    fn sensors_share_one_field() {
        let shared = field(Scenario::Stable, 2).shared();
        let mut soil = SimSoil::new("soil_1", Arc::clone(&shared), 1, Calibration::soil(700, 300));
        let mut light = SimLight::new("light", Arc::clone(&shared));
        let mut climate = SimClimate::new("dht22", Arc::clone(&shared));

        let pct = soil.read().unwrap();
        assert!((0.0..=100.0).contains(&pct));
        let lux = light.read().unwrap();
        assert!((0.0..=100.0).contains(&lux));
        assert!(climate.read().is_ok());
    }

    #[test]
    fn soil_sensor_for_missing_zone_is_unavailable() {
        let shared = field(Scenario::Stable, 1).shared();
        let mut soil = SimSoil::new("soil_5", shared, 5, Calibration::soil(700, 300));
        assert!(matches!(soil.read(), Err(SensorError::Unavailable { .. })));
    }

    #[test]
    fn full_fault_rate_always_fails() {
        let shared = field(Scenario::Stable, 1).with_fault_rate(1.0).shared();
        let mut rain = SimRain::new("rain", shared);
        for _ in 0..20 {
            let err = rain.read().unwrap_err();
            assert_eq!(err.sensor(), "rain");
        }
    }

    #[test]
    fn zero_fault_rate_never_fails() {
        let shared = field(Scenario::Flaky, 1).shared();
        let mut soil = SimSoil::new("soil_0", shared, 0, Calibration::soil(700, 300));
        assert!((0..200).all(|_| soil.read().is_ok()));
    }

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("STABLE"), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy("Flaky"), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("wet"), Scenario::Wet);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Drying);
    }

    #[test]
    fn scenario_display() {
        assert_eq!(Scenario::Drying.to_string(), "drying");
        assert_eq!(Scenario::Wet.to_string(), "wet");
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let n = 5000;
        let mean = (0..n).map(|_| approx_std_normal()).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.15, "mean should be near zero: {mean}");
    }
}
