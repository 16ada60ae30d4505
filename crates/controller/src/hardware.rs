//! Builds the sensor suite and actuator bank from config. With the `gpio`
//! feature these are the real Pi drivers; otherwise mock relay/servo lines
//! and a simulated field coupled to the pump relay.

use anyhow::{Context, Result};
use bloom_hardware::{RelaySwitch, Servo};

use crate::actuators::ActuatorBank;
use crate::config::Config;
use crate::sensors::SensorSuite;

fn build_bank(cfg: &Config, pump: RelaySwitch) -> Result<ActuatorBank> {
    let low = cfg.pins.relay_active_low;
    let fan = RelaySwitch::new("fan", cfg.pins.fan_relay, low).context("fan relay init")?;
    let lamp = RelaySwitch::new("lamp", cfg.pins.lamp_relay, low).context("lamp relay init")?;
    let shelter = Servo::new("shelter", cfg.pins.servo, cfg.shelter.open_angle)
        .context("shelter servo init")?;
    Ok(ActuatorBank::new(
        Box::new(pump),
        Box::new(fan),
        Box::new(lamp),
        Box::new(shelter),
        &cfg.shelter,
    ))
}

// ---------------------------------------------------------------------------
// Real hardware (production: rppal on a Raspberry Pi)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub fn init(cfg: &Config) -> Result<(SensorSuite, ActuatorBank)> {
    use bloom_hardware::adc::{AnalogChannel, Mcp3008};
    use bloom_hardware::calibration::Calibration;
    use bloom_hardware::dht22::Dht22;
    use bloom_hardware::rain::RainDetector;
    use std::sync::{Arc, Mutex};

    let pump = RelaySwitch::new("pump", cfg.pins.pump_relay, cfg.pins.relay_active_low)
        .context("pump relay init")?;
    let bank = build_bank(cfg, pump)?;

    let adc = Arc::new(Mutex::new(Mcp3008::open().context("mcp3008 init")?));
    let soil_cal = Calibration::soil(cfg.adc.soil_raw_dry, cfg.adc.soil_raw_wet);

    let mut suite = SensorSuite::new()
        .with_climate(Box::new(Dht22::new(cfg.pins.dht22).context("dht22 init")?))
        .with_rain(Box::new(RainDetector::new(cfg.pins.rain).context("rain sensor init")?));

    for (zone, ch) in cfg.adc.soil_channels.iter().enumerate() {
        suite = suite.with_soil(Box::new(AnalogChannel::new(
            format!("soil_{zone}"),
            Arc::clone(&adc),
            *ch,
            soil_cal,
        )));
    }
    if let Some(ch) = cfg.adc.light_channel {
        suite = suite.with_light(Box::new(AnalogChannel::new(
            "light",
            Arc::clone(&adc),
            ch,
            Calibration::full_scale(),
        )));
    }

    tracing::info!(zones = suite.zone_count(), "hardware initialised");
    Ok((suite, bank))
}

// ---------------------------------------------------------------------------
// Simulator (development: no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub fn init(cfg: &Config) -> Result<(SensorSuite, ActuatorBank)> {
    use bloom_hardware::calibration::Calibration;
    use bloom_hardware::sim::{SimClimate, SimField, SimLight, SimRain, SimSoil};
    use std::sync::Arc;

    let pump = RelaySwitch::new("pump", cfg.pins.pump_relay, cfg.pins.relay_active_low)
        .context("pump relay init")?;
    let pump_line = pump.line();
    let bank = build_bank(cfg, pump)?;

    let scenario = sim_scenario(cfg, std::env::var("SIM_SCENARIO").ok());
    let field = SimField::new(
        scenario,
        cfg.adc.soil_channels.len(),
        cfg.adc.soil_raw_dry as f64,
        cfg.adc.soil_raw_wet as f64,
        cfg.sim.diurnal_period_secs,
    )
    .with_pump_line(pump_line)
    .with_fault_rate(cfg.sim.fault_rate)
    .shared();

    let soil_cal = Calibration::soil(cfg.adc.soil_raw_dry, cfg.adc.soil_raw_wet);
    let mut suite = SensorSuite::new()
        .with_climate(Box::new(SimClimate::new("dht22", Arc::clone(&field))))
        .with_rain(Box::new(SimRain::new("rain", Arc::clone(&field))));
    for zone in 0..cfg.adc.soil_channels.len() {
        suite = suite.with_soil(Box::new(SimSoil::new(
            &format!("soil_{zone}"),
            Arc::clone(&field),
            zone,
            soil_cal,
        )));
    }
    if cfg.adc.light_channel.is_some() {
        suite = suite.with_light(Box::new(SimLight::new("light", Arc::clone(&field))));
    }

    tracing::info!(%scenario, zones = suite.zone_count(), "simulated field initialised (no gpio feature)");
    Ok((suite, bank))
}

/// `SIM_SCENARIO` wins over `sim.scenario`.
#[cfg(not(feature = "gpio"))]
fn sim_scenario(cfg: &Config, env: Option<String>) -> bloom_hardware::sim::Scenario {
    bloom_hardware::sim::Scenario::from_str_lossy(env.as_deref().unwrap_or(&cfg.sim.scenario))
}

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::model::ActuatorState;
    use bloom_hardware::Power;

    #[test]
    fn sim_scenario_env_overrides_config() {
        use bloom_hardware::sim::Scenario;
        let mut cfg = Config::default();
        cfg.sim.scenario = "wet".into();
        assert_eq!(sim_scenario(&cfg, None), Scenario::Wet);
        assert_eq!(sim_scenario(&cfg, Some("flaky".into())), Scenario::Flaky);
    }

    #[test]
    fn simulated_hardware_matches_config() {
        let cfg = Config::default();
        let (mut suite, bank) = init(&cfg).unwrap();
        assert_eq!(suite.zone_count(), 2);
        assert_eq!(bank.state(), ActuatorState::SAFE);

        let sample = suite.sample(0);
        assert_eq!(sample.snapshot.soil_moisture.len(), 2);
        assert!(sample.snapshot.temperature.is_some());
        assert!(sample.snapshot.light_level.is_some());
    }

    #[test]
    fn simulated_bank_drives_mock_lines() {
        let (_, mut bank) = init(&Config::default()).unwrap();
        let desired = ActuatorState {
            pump: Power::On,
            ..ActuatorState::SAFE
        };
        assert!(bank.apply(&desired).is_empty());
        assert_eq!(bank.state().pump, Power::On);
    }
}
