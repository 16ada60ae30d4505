//! Threshold evaluation: snapshot + bounds + current outputs -> desired
//! outputs. Pure; the control loop decides whether to apply the result.
//!
//! Every rule holds the current state when its input is unknown, and uses a
//! hysteresis band so outputs do not chatter around a single threshold.

use bloom_hardware::Power;

use crate::config::ThresholdConfig;
use crate::model::{ActuatorState, SensorSnapshot, Shelter};

pub fn evaluate(
    snapshot: &SensorSnapshot,
    thresholds: &ThresholdConfig,
    current: &ActuatorState,
) -> ActuatorState {
    ActuatorState {
        pump: pump(snapshot, thresholds, current.pump),
        fan: band(
            snapshot.temperature,
            current.fan,
            |t| t > thresholds.fan_on_above,
            |t| t < thresholds.fan_off_below,
        ),
        lamp: band(
            snapshot.light_level,
            current.lamp,
            |l| l < thresholds.lamp_on_below,
            |l| l > thresholds.lamp_off_above,
        ),
        shelter: match snapshot.rain_detected {
            Some(true) => Shelter::Closed,
            Some(false) => Shelter::Open,
            None => current.shelter,
        },
    }
}

fn pump(snapshot: &SensorSnapshot, t: &ThresholdConfig, current: Power) -> Power {
    match snapshot.rain_detected {
        Some(true) => Power::Off,
        // Rain can only veto watering, so wet soil still stops the pump.
        None => band(
            snapshot.mean_soil_moisture(),
            current,
            |_| false,
            |m| m >= t.soil_high,
        ),
        Some(false) => band(
            snapshot.mean_soil_moisture(),
            current,
            |m| m < t.soil_low,
            |m| m >= t.soil_high,
        ),
    }
}

fn band(
    value: Option<f32>,
    current: Power,
    turn_on: impl Fn(f32) -> bool,
    turn_off: impl Fn(f32) -> bool,
) -> Power {
    match value {
        Some(v) if turn_on(v) => Power::On,
        Some(v) if turn_off(v) => Power::Off,
        _ => current,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SensorSnapshot {
        SensorSnapshot {
            ts: 0,
            temperature: Some(25.0),
            humidity: Some(60.0),
            soil_moisture: vec![Some(50.0)],
            light_level: Some(30.0),
            rain_detected: Some(false),
        }
    }

    fn with(pump: Power) -> ActuatorState {
        ActuatorState {
            pump,
            ..ActuatorState::SAFE
        }
    }

    fn eval(s: &SensorSnapshot, current: &ActuatorState) -> ActuatorState {
        evaluate(s, &ThresholdConfig::default(), current)
    }

    // -- Pump -------------------------------------------------------------

    #[test]
    fn dry_soil_starts_pump() {
        let mut s = snapshot();
        s.soil_moisture = vec![Some(25.0)];
        assert_eq!(eval(&s, &with(Power::Off)).pump, Power::On);
    }

    #[test]
    fn wet_soil_stops_pump() {
        let mut s = snapshot();
        s.soil_moisture = vec![Some(75.0)];
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::Off);
    }

    #[test]
    fn stop_is_inclusive_at_high_threshold() {
        let mut s = snapshot();
        s.soil_moisture = vec![Some(70.0)];
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::Off);
    }

    #[test]
    fn pump_hysteresis_holds_inside_band() {
        let mut s = snapshot();
        let mut state = with(Power::Off);

        s.soil_moisture = vec![Some(29.0)];
        state = eval(&s, &state);
        assert_eq!(state.pump, Power::On);

        for m in [35.0, 50.0, 69.9] {
            s.soil_moisture = vec![Some(m)];
            state = eval(&s, &state);
            assert_eq!(state.pump, Power::On, "should stay on at {m}");
        }

        s.soil_moisture = vec![Some(70.0)];
        state = eval(&s, &state);
        assert_eq!(state.pump, Power::Off);

        s.soil_moisture = vec![Some(50.0)];
        assert_eq!(eval(&s, &state).pump, Power::Off);
    }

    #[test]
    fn unknown_moisture_holds_pump() {
        let mut s = snapshot();
        s.soil_moisture = vec![None, None];
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::On);
        assert_eq!(eval(&s, &with(Power::Off)).pump, Power::Off);
    }

    #[test]
    fn mean_of_known_zones_drives_pump() {
        let mut s = snapshot();
        s.soil_moisture = vec![Some(10.0), None, Some(40.0)];
        assert_eq!(eval(&s, &with(Power::Off)).pump, Power::On);
    }

    #[test]
    fn rain_forces_pump_off_for_any_moisture() {
        let mut s = snapshot();
        s.rain_detected = Some(true);
        for m in [0.0, 10.0, 29.0, 50.0, 100.0] {
            s.soil_moisture = vec![Some(m)];
            assert_eq!(eval(&s, &with(Power::On)).pump, Power::Off, "moisture {m}");
        }
    }

    #[test]
    fn unknown_rain_holds_pump() {
        let mut s = snapshot();
        s.rain_detected = None;
        s.soil_moisture = vec![Some(5.0)];
        assert_eq!(eval(&s, &with(Power::Off)).pump, Power::Off);
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::On);
    }

    #[test]
    fn unknown_rain_still_stops_pump_on_wet_soil() {
        let mut s = snapshot();
        s.rain_detected = None;
        s.soil_moisture = vec![Some(85.0)];
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::Off);

        s.soil_moisture = vec![Some(50.0)];
        assert_eq!(eval(&s, &with(Power::On)).pump, Power::On);
    }

    // -- Fan --------------------------------------------------------------

    #[test]
    fn hot_starts_fan_and_cool_stops_it() {
        let mut s = snapshot();
        s.temperature = Some(36.0);
        let on = eval(&s, &ActuatorState::SAFE);
        assert_eq!(on.fan, Power::On);

        s.temperature = Some(18.0);
        assert_eq!(eval(&s, &on).fan, Power::Off);
    }

    #[test]
    fn fan_holds_between_thresholds() {
        let mut s = snapshot();
        s.temperature = Some(32.0);
        let state = ActuatorState {
            fan: Power::On,
            ..ActuatorState::SAFE
        };
        assert_eq!(eval(&s, &state).fan, Power::On);
        assert_eq!(eval(&s, &ActuatorState::SAFE).fan, Power::Off);
    }

    #[test]
    fn unknown_temperature_holds_fan() {
        let mut s = snapshot();
        s.temperature = None;
        let state = ActuatorState {
            fan: Power::On,
            ..ActuatorState::SAFE
        };
        assert_eq!(eval(&s, &state).fan, Power::On);
    }

    // -- Lamp -------------------------------------------------------------

    #[test]
    fn dark_starts_lamp_and_bright_stops_it() {
        let mut s = snapshot();
        s.light_level = Some(10.0);
        let on = eval(&s, &ActuatorState::SAFE);
        assert_eq!(on.lamp, Power::On);

        s.light_level = Some(30.0);
        assert_eq!(eval(&s, &on).lamp, Power::On);

        s.light_level = Some(45.0);
        assert_eq!(eval(&s, &on).lamp, Power::Off);
    }

    // -- Shelter ----------------------------------------------------------

    #[test]
    fn rain_closes_shelter_and_dry_opens_it() {
        let mut s = snapshot();
        s.rain_detected = Some(true);
        let closed = eval(&s, &ActuatorState::SAFE);
        assert_eq!(closed.shelter, Shelter::Closed);

        s.rain_detected = Some(false);
        assert_eq!(eval(&s, &closed).shelter, Shelter::Open);
    }

    #[test]
    fn unknown_rain_holds_shelter() {
        let mut s = snapshot();
        s.rain_detected = None;
        let state = ActuatorState {
            shelter: Shelter::Closed,
            ..ActuatorState::SAFE
        };
        assert_eq!(eval(&s, &state).shelter, Shelter::Closed);
    }

    #[test]
    fn all_unknown_holds_everything() {
        let s = SensorSnapshot::unknown(0, 2);
        let state = ActuatorState {
            pump: Power::On,
            fan: Power::On,
            lamp: Power::Off,
            shelter: Shelter::Closed,
        };
        assert_eq!(eval(&s, &state), state);
    }
}
