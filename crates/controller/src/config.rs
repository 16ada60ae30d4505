//! TOML config file loading and validation. Every field has a default, so an
//! empty file describes the stock BloomBotanics wiring.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use time::macros::format_description;

use crate::alerts::Severity;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub farm_name: String,
    pub mode: Mode,
    pub pins: Pins,
    pub adc: AdcConfig,
    pub thresholds: ThresholdConfig,
    pub irrigation: IrrigationGuard,
    pub shelter: ShelterConfig,
    pub timing: Timing,
    pub alerts: AlertConfig,
    pub health: HealthLimits,
    pub storage: StorageConfig,
    pub sim: SimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            farm_name: "BloomBotanics Farm".into(),
            mode: Mode::Auto,
            pins: Pins::default(),
            adc: AdcConfig::default(),
            thresholds: ThresholdConfig::default(),
            irrigation: IrrigationGuard::default(),
            shelter: ShelterConfig::default(),
            timing: Timing::default(),
            alerts: AlertConfig::default(),
            health: HealthLimits::default(),
            storage: StorageConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

/// `auto` drives actuators; `monitor` only reads, logs and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Monitor,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

/// BCM pin numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub dht22: u8,
    pub rain: u8,
    pub pump_relay: u8,
    pub lamp_relay: u8,
    pub fan_relay: u8,
    pub servo: u8,
    /// Most opto-isolated relay boards switch on a LOW input.
    pub relay_active_low: bool,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            dht22: 4,
            rain: 17,
            pump_relay: 27,
            lamp_relay: 22,
            fan_relay: 12,
            servo: 18,
            relay_active_low: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    /// MCP3008 channel per soil zone, in zone order.
    pub soil_channels: Vec<u8>,
    pub light_channel: Option<u8>,
    pub soil_raw_dry: u16,
    pub soil_raw_wet: u16,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            soil_channels: vec![0, 1],
            light_channel: Some(2),
            soil_raw_dry: 700,
            soil_raw_wet: 300,
        }
    }
}

/// Numeric bounds driving the evaluator and the environmental alerts.
/// Percentages are 0..=100, temperatures °C.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub soil_low: f32,
    pub soil_high: f32,
    pub fan_on_above: f32,
    pub fan_off_below: f32,
    pub lamp_on_below: f32,
    pub lamp_off_above: f32,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub humidity_min: f32,
    pub humidity_max: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            soil_low: 30.0,
            soil_high: 70.0,
            fan_on_above: 35.0,
            fan_off_below: 30.0,
            lamp_on_below: 20.0,
            lamp_off_above: 40.0,
            temperature_min: 10.0,
            temperature_max: 35.0,
            humidity_min: 40.0,
            humidity_max: 80.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IrrigationGuard {
    /// Longest continuous pump run before a forced stop.
    pub max_run_secs: u64,
    /// Lockout after a forced stop.
    pub rest_secs: u64,
}

impl Default for IrrigationGuard {
    fn default() -> Self {
        Self {
            max_run_secs: 1800,
            rest_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShelterConfig {
    pub open_angle: u8,
    pub closed_angle: u8,
}

impl Default for ShelterConfig {
    fn default() -> Self {
        Self {
            open_angle: 0,
            closed_angle: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub sensor_read_interval_secs: u64,
    pub data_log_interval_secs: u64,
    pub health_check_interval_secs: u64,
    pub status_every_loops: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sensor_read_interval_secs: 30,
            data_log_interval_secs: 300,
            health_check_interval_secs: 600,
            status_every_loops: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Suppression window for repeated Warning/Critical alerts of one kind.
    pub cooldown_secs: u64,
    /// Consecutive failed reads before a sensor fault is raised.
    pub sensor_fault_after: u32,
    /// UTC wall-clock time ("HH:MM") for the daily summary; absent disables it.
    pub daily_report: Option<String>,
    pub mqtt: Option<MqttConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            sensor_fault_after: 3,
            daily_report: Some("08:00".into()),
            mqtt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub min_severity: Severity,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "bloom-controller".into(),
            topic_prefix: "bloom/alerts".into(),
            min_severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthLimits {
    pub cpu_temp_warning: f32,
    pub cpu_temp_critical: f32,
    pub memory_warning_pct: f32,
    pub disk_warning_pct: f32,
}

impl Default for HealthLimits {
    fn default() -> Self {
        Self {
            cpu_temp_warning: 70.0,
            cpu_temp_critical: 80.0,
            memory_warning_pct: 80.0,
            disk_warning_pct: 80.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON status snapshot rewritten every iteration, for dashboards.
    pub status_file: Option<String>,
}

/// Field simulator settings, used when built without the `gpio` feature.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scenario: String,
    pub diurnal_period_secs: f64,
    pub fault_rate: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scenario: "drying".into(),
            diurnal_period_secs: 86_400.0,
            fault_rate: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// SPI0 lines (CE0, MISO, MOSI, SCLK) taken by the MCP3008.
const SPI0_PINS: &[u8] = &[8, 9, 10, 11];

const MCP3008_MAX_CHANNEL: u8 = 7;
const MCP3008_MAX_RAW: u16 = 1023;
const SERVO_MAX_ANGLE: u8 = 180;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all sections. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.farm_name.trim().is_empty() {
            errors.push("farm_name is empty".into());
        }
        self.validate_pins(&mut errors);
        self.validate_adc(&mut errors);
        self.validate_thresholds(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_alerts(&mut errors);
        self.validate_health(&mut errors);

        if self.shelter.open_angle > SERVO_MAX_ANGLE || self.shelter.closed_angle > SERVO_MAX_ANGLE {
            errors.push(format!(
                "shelter: angles must be within 0-{SERVO_MAX_ANGLE}, got open={} closed={}",
                self.shelter.open_angle, self.shelter.closed_angle
            ));
        }
        if self.shelter.open_angle == self.shelter.closed_angle {
            errors.push(format!(
                "shelter: open_angle and closed_angle are both {}",
                self.shelter.open_angle
            ));
        }

        if self.irrigation.max_run_secs == 0 {
            errors.push("irrigation: max_run_secs must be positive".into());
        }

        if !(0.0..=1.0).contains(&self.sim.fault_rate) {
            errors.push(format!(
                "sim: fault_rate {} out of range [0.0, 1.0]",
                self.sim.fault_rate
            ));
        }
        if self.sim.diurnal_period_secs <= 0.0 {
            errors.push("sim: diurnal_period_secs must be positive".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        let p = &self.pins;
        let mut seen: HashSet<u8> = HashSet::new();

        for (name, pin) in [
            ("dht22", p.dht22),
            ("rain", p.rain),
            ("pump_relay", p.pump_relay),
            ("lamp_relay", p.lamp_relay),
            ("fan_relay", p.fan_relay),
            ("servo", p.servo),
        ] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "pins.{name}: {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else if SPI0_PINS.contains(&pin) {
                errors.push(format!(
                    "pins.{name}: {pin} is reserved for the MCP3008 SPI bus"
                ));
            } else if !seen.insert(pin) {
                errors.push(format!("pins.{name}: {pin} is already used by another device"));
            }
        }
    }

    fn validate_adc(&self, errors: &mut Vec<String>) {
        let a = &self.adc;
        let mut seen: HashSet<u8> = HashSet::new();

        if a.soil_channels.is_empty() {
            errors.push("adc: soil_channels is empty".into());
        }

        let channels = a
            .soil_channels
            .iter()
            .map(|c| ("soil_channels", *c))
            .chain(a.light_channel.map(|c| ("light_channel", c)));

        for (name, ch) in channels {
            if ch > MCP3008_MAX_CHANNEL {
                errors.push(format!(
                    "adc.{name}: channel {ch} out of MCP3008 range [0, {MCP3008_MAX_CHANNEL}]"
                ));
            } else if !seen.insert(ch) {
                errors.push(format!("adc.{name}: channel {ch} is already in use"));
            }
        }

        // ── Calibration ─────────────────────────────────────
        for (name, raw) in [("soil_raw_dry", a.soil_raw_dry), ("soil_raw_wet", a.soil_raw_wet)] {
            if raw > MCP3008_MAX_RAW {
                errors.push(format!(
                    "adc.{name}: {raw} out of MCP3008 range [0, {MCP3008_MAX_RAW}]"
                ));
            }
        }
        if a.soil_raw_dry == a.soil_raw_wet {
            errors.push(format!(
                "adc: soil_raw_dry and soil_raw_wet are both {}; calibration range is zero",
                a.soil_raw_dry
            ));
        }
    }

    fn validate_thresholds(&self, errors: &mut Vec<String>) {
        let t = &self.thresholds;

        for (name, v) in [
            ("soil_low", t.soil_low),
            ("soil_high", t.soil_high),
            ("lamp_on_below", t.lamp_on_below),
            ("lamp_off_above", t.lamp_off_above),
            ("humidity_min", t.humidity_min),
            ("humidity_max", t.humidity_max),
        ] {
            if !(0.0..=100.0).contains(&v) {
                errors.push(format!("thresholds.{name}: {v} out of range [0, 100]"));
            }
        }

        // ── Hysteresis bands ────────────────────────────────
        if t.soil_low >= t.soil_high {
            errors.push(format!(
                "thresholds: soil_high ({}) must be greater than soil_low ({})",
                t.soil_high, t.soil_low
            ));
        }
        if t.fan_off_below >= t.fan_on_above {
            errors.push(format!(
                "thresholds: fan_on_above ({}) must be greater than fan_off_below ({})",
                t.fan_on_above, t.fan_off_below
            ));
        }
        if t.lamp_on_below >= t.lamp_off_above {
            errors.push(format!(
                "thresholds: lamp_off_above ({}) must be greater than lamp_on_below ({})",
                t.lamp_off_above, t.lamp_on_below
            ));
        }

        // ── Alert bounds ────────────────────────────────────
        if t.temperature_min >= t.temperature_max {
            errors.push(format!(
                "thresholds: temperature_max ({}) must be greater than temperature_min ({})",
                t.temperature_max, t.temperature_min
            ));
        }
        if t.humidity_min >= t.humidity_max {
            errors.push(format!(
                "thresholds: humidity_max ({}) must be greater than humidity_min ({})",
                t.humidity_max, t.humidity_min
            ));
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;
        for (name, v) in [
            ("sensor_read_interval_secs", t.sensor_read_interval_secs),
            ("data_log_interval_secs", t.data_log_interval_secs),
            ("health_check_interval_secs", t.health_check_interval_secs),
            ("status_every_loops", t.status_every_loops),
        ] {
            if v == 0 {
                errors.push(format!("timing.{name} must be positive, got {v}"));
            }
        }
    }

    fn validate_alerts(&self, errors: &mut Vec<String>) {
        let a = &self.alerts;
        if a.sensor_fault_after == 0 {
            errors.push("alerts.sensor_fault_after must be positive".into());
        }
        if let Some(at) = &a.daily_report {
            if parse_report_time(at).is_err() {
                errors.push(format!("alerts.daily_report: '{at}' is not a valid HH:MM time"));
            }
        }
        if let Some(m) = &a.mqtt {
            if m.host.trim().is_empty() {
                errors.push("alerts.mqtt: host is empty".into());
            }
            if m.port == 0 {
                errors.push("alerts.mqtt: port must be positive".into());
            }
            if m.topic_prefix.trim().is_empty() {
                errors.push("alerts.mqtt: topic_prefix is empty".into());
            }
        }
    }

    fn validate_health(&self, errors: &mut Vec<String>) {
        let h = &self.health;
        if h.cpu_temp_warning >= h.cpu_temp_critical {
            errors.push(format!(
                "health: cpu_temp_critical ({}) must be greater than cpu_temp_warning ({})",
                h.cpu_temp_critical, h.cpu_temp_warning
            ));
        }
        for (name, v) in [
            ("memory_warning_pct", h.memory_warning_pct),
            ("disk_warning_pct", h.disk_warning_pct),
        ] {
            if !(0.0..=100.0).contains(&v) {
                errors.push(format!("health.{name}: {v} out of range [0, 100]"));
            }
        }
    }

    /// Parsed daily report time, if enabled.
    pub fn daily_report_time(&self) -> Option<time::Time> {
        self.alerts
            .daily_report
            .as_deref()
            .and_then(|s| parse_report_time(s).ok())
    }
}

fn parse_report_time(s: &str) -> Result<time::Time, time::error::Parse> {
    time::Time::parse(s.trim(), format_description!("[hour]:[minute]"))
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn example_config_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../../../config.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.adc.light_channel, Some(2));
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.farm_name, "BloomBotanics Farm");
        assert_eq!(config.mode, Mode::Auto);
        assert_eq!(config.pins.dht22, 4);
        assert_eq!(config.pins.pump_relay, 27);
        assert_eq!(config.adc.soil_channels, vec![0, 1]);
        assert_eq!(config.thresholds, ThresholdConfig::default());
        assert_eq!(config.irrigation.max_run_secs, 1800);
        assert_eq!(config.timing.sensor_read_interval_secs, 30);
        assert_eq!(config.alerts.cooldown_secs, 300);
        assert!(config.alerts.mqtt.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
mode = "monitor"

[thresholds]
soil_low = 25.0
soil_high = 60.0

[adc]
soil_channels = [0, 1, 3]

[alerts.mqtt]
host = "broker.local"
min_severity = "critical"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mode, Mode::Monitor);
        assert_eq!(config.thresholds.soil_low, 25.0);
        // untouched fields keep their defaults
        assert_eq!(config.thresholds.fan_on_above, 35.0);
        assert_eq!(config.adc.soil_channels.len(), 3);
        let mqtt = config.alerts.mqtt.as_ref().unwrap();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.min_severity, Severity::Critical);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_mode_fails_to_parse() {
        assert!(toml::from_str::<Config>(r#"mode = "manual""#).is_err());
    }

    // -- Pins -------------------------------------------------------------

    #[test]
    fn pin_0_rejected() {
        let mut cfg = Config::default();
        cfg.pins.dht22 = 0;
        assert_validation_err(&cfg, "pins.dht22: 0 is not a valid BCM GPIO pin");
    }

    #[test]
    fn pin_28_rejected() {
        let mut cfg = Config::default();
        cfg.pins.servo = 28;
        assert_validation_err(&cfg, "pins.servo: 28");
    }

    #[test]
    fn pin_boundaries_accepted() {
        let mut cfg = Config::default();
        cfg.pins.dht22 = 2;
        cfg.pins.rain = 27;
        cfg.pins.pump_relay = 23;
        cfg.validate().unwrap();
    }

    #[test]
    fn spi_pin_rejected() {
        let mut cfg = Config::default();
        cfg.pins.fan_relay = 10;
        assert_validation_err(&cfg, "reserved for the MCP3008 SPI bus");
    }

    #[test]
    fn duplicate_pin_rejected() {
        let mut cfg = Config::default();
        cfg.pins.lamp_relay = cfg.pins.pump_relay;
        assert_validation_err(&cfg, "pins.lamp_relay: 27 is already used");
    }

    // -- ADC --------------------------------------------------------------

    #[test]
    fn adc_channel_out_of_range() {
        let mut cfg = Config::default();
        cfg.adc.soil_channels = vec![0, 8];
        assert_validation_err(&cfg, "channel 8 out of MCP3008 range");
    }

    #[test]
    fn adc_light_channel_collides_with_soil() {
        let mut cfg = Config::default();
        cfg.adc.light_channel = Some(1);
        assert_validation_err(&cfg, "adc.light_channel: channel 1 is already in use");
    }

    #[test]
    fn adc_no_soil_channels() {
        let mut cfg = Config::default();
        cfg.adc.soil_channels.clear();
        assert_validation_err(&cfg, "soil_channels is empty");
    }

    #[test]
    fn adc_raw_above_10_bits() {
        let mut cfg = Config::default();
        cfg.adc.soil_raw_dry = 2000;
        assert_validation_err(&cfg, "adc.soil_raw_dry: 2000 out of MCP3008 range");
    }

    #[test]
    fn adc_zero_calibration_range() {
        let mut cfg = Config::default();
        cfg.adc.soil_raw_wet = 700;
        assert_validation_err(&cfg, "calibration range is zero");
    }

    #[test]
    fn light_channel_can_be_disabled() {
        let mut cfg = Config::default();
        cfg.adc.light_channel = None;
        cfg.validate().unwrap();
    }

    // -- Thresholds -------------------------------------------------------

    #[test]
    fn soil_band_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.thresholds.soil_low = 70.0;
        cfg.thresholds.soil_high = 30.0;
        assert_validation_err(&cfg, "soil_high (30) must be greater than soil_low (70)");
    }

    #[test]
    fn fan_band_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.thresholds.fan_off_below = 35.0;
        assert_validation_err(&cfg, "fan_on_above (35) must be greater than fan_off_below (35)");
    }

    #[test]
    fn lamp_band_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.thresholds.lamp_on_below = 50.0;
        assert_validation_err(&cfg, "lamp_off_above (40) must be greater than lamp_on_below (50)");
    }

    #[test]
    fn percent_threshold_out_of_range() {
        let mut cfg = Config::default();
        cfg.thresholds.soil_high = 120.0;
        assert_validation_err(&cfg, "thresholds.soil_high: 120 out of range");
    }

    // -- Timing, alerts, health -------------------------------------------

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = Config::default();
        cfg.timing.sensor_read_interval_secs = 0;
        assert_validation_err(&cfg, "timing.sensor_read_interval_secs must be positive");
    }

    #[test]
    fn bad_report_time_rejected() {
        let mut cfg = Config::default();
        cfg.alerts.daily_report = Some("25:00".into());
        assert_validation_err(&cfg, "'25:00' is not a valid HH:MM time");
    }

    #[test]
    fn report_time_parses() {
        let mut cfg = Config::default();
        cfg.alerts.daily_report = Some("06:30".into());
        let t = cfg.daily_report_time().unwrap();
        assert_eq!((t.hour(), t.minute()), (6, 30));
    }

    #[test]
    fn report_can_be_disabled() {
        let mut cfg = Config::default();
        cfg.alerts.daily_report = None;
        cfg.validate().unwrap();
        assert!(cfg.daily_report_time().is_none());
    }

    #[test]
    fn zero_fault_streak_rejected() {
        let mut cfg = Config::default();
        cfg.alerts.sensor_fault_after = 0;
        assert_validation_err(&cfg, "sensor_fault_after must be positive");
    }

    #[test]
    fn cpu_limits_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.health.cpu_temp_critical = 60.0;
        assert_validation_err(&cfg, "cpu_temp_critical (60) must be greater than cpu_temp_warning (70)");
    }

    #[test]
    fn servo_angles_checked() {
        let mut cfg = Config::default();
        cfg.shelter.closed_angle = 200;
        assert_validation_err(&cfg, "shelter: angles must be within 0-180");

        let mut cfg = Config::default();
        cfg.shelter.closed_angle = cfg.shelter.open_angle;
        assert_validation_err(&cfg, "open_angle and closed_angle are both 0");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.pins.dht22 = 1;
        cfg.thresholds.soil_low = 80.0;
        cfg.timing.data_log_interval_secs = 0;

        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "got: {msg}");
        assert!(msg.contains("pins.dht22"));
        assert!(msg.contains("soil_high"));
        assert!(msg.contains("data_log_interval_secs"));
    }

    // -- Load -------------------------------------------------------------

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "farm_name = \"Test Plot\"\n[timing]\nsensor_read_interval_secs = 5").unwrap();

        let cfg = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.farm_name, "Test Plot");
        assert_eq!(cfg.timing.sensor_read_interval_secs, 5);
    }

    #[test]
    fn load_reports_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pins]\nservo = 40").unwrap();

        let msg = format!("{:#}", load(file.path().to_str().unwrap()).unwrap_err());
        assert!(msg.contains("invalid config"), "got: {msg}");
        assert!(msg.contains("pins.servo"), "got: {msg}");
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let msg = format!("{:#}", load(path.to_str().unwrap()).unwrap_err());
        assert!(msg.contains("failed to read config"), "got: {msg}");
    }
}
