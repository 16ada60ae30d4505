//! The set of outputs the controller drives, and the mapping between
//! [`ActuatorState`] and individual actuator commands.

use bloom_hardware::{Actuator, ActuatorError, Power};
use tracing::{info, warn};

use crate::config::ShelterConfig;
use crate::model::{ActuatorState, Shelter};

pub type Switch = Box<dyn Actuator<State = Power> + Send>;
pub type Positioner = Box<dyn Actuator<State = u8> + Send>;

pub struct ActuatorBank {
    pump: Switch,
    fan: Switch,
    lamp: Switch,
    shelter: Positioner,
    open_angle: u8,
    closed_angle: u8,
}

impl ActuatorBank {
    pub fn new(pump: Switch, fan: Switch, lamp: Switch, shelter: Positioner, angles: &ShelterConfig) -> Self {
        Self {
            pump,
            fan,
            lamp,
            shelter,
            open_angle: angles.open_angle,
            closed_angle: angles.closed_angle,
        }
    }

    pub fn state(&self) -> ActuatorState {
        ActuatorState {
            pump: self.pump.state(),
            fan: self.fan.state(),
            lamp: self.lamp.state(),
            shelter: if self.shelter.state() == self.closed_angle {
                Shelter::Closed
            } else {
                Shelter::Open
            },
        }
    }

    fn angle_for(&self, shelter: Shelter) -> u8 {
        match shelter {
            Shelter::Open => self.open_angle,
            Shelter::Closed => self.closed_angle,
        }
    }

    /// Drive every actuator toward `desired`. Each one is attempted even if
    /// an earlier one fails; failures are returned and the failed actuator
    /// keeps its previous state.
    pub fn apply(&mut self, desired: &ActuatorState) -> Vec<ActuatorError> {
        let before = self.state();
        let mut errors = Vec::new();

        for (relay, want) in [
            (&mut self.pump, desired.pump),
            (&mut self.fan, desired.fan),
            (&mut self.lamp, desired.lamp),
        ] {
            if let Err(e) = relay.set(want) {
                warn!(actuator = relay.name(), error = %e, "actuator command failed");
                errors.push(e);
            }
        }

        let angle = self.angle_for(desired.shelter);
        if let Err(e) = self.shelter.set(angle) {
            warn!(actuator = self.shelter.name(), error = %e, "actuator command failed");
            errors.push(e);
        }

        let after = self.state();
        if after != before {
            info!(
                pump = %after.pump,
                fan = %after.fan,
                lamp = %after.lamp,
                shelter = %after.shelter,
                "actuators changed"
            );
        }
        errors
    }

    /// Pump, fan and lamp off; shelter open.
    pub fn safe_state(&mut self) -> Vec<ActuatorError> {
        self.apply(&ActuatorState::SAFE)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared view into a fake actuator, kept by the test after the actuator
    /// is boxed into the bank.
    #[derive(Default)]
    pub(crate) struct Probe {
        pub(crate) writes: usize,
        pub(crate) jammed: bool,
    }

    pub(crate) struct Fake<S> {
        name: String,
        state: S,
        probe: Arc<Mutex<Probe>>,
    }

    impl<S> Fake<S> {
        pub(crate) fn new(name: &str, state: S) -> (Self, Arc<Mutex<Probe>>) {
            let probe = Arc::new(Mutex::new(Probe::default()));
            (
                Self {
                    name: name.to_string(),
                    state,
                    probe: Arc::clone(&probe),
                },
                probe,
            )
        }
    }

    impl<S: Copy + PartialEq + std::fmt::Debug> Actuator for Fake<S> {
        type State = S;

        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> S {
            self.state
        }

        fn set(&mut self, desired: S) -> Result<(), ActuatorError> {
            if desired == self.state {
                return Ok(());
            }
            let mut probe = self.probe.lock().unwrap();
            if probe.jammed {
                return Err(ActuatorError::Write {
                    actuator: self.name.clone(),
                    detail: "jammed".into(),
                });
            }
            probe.writes += 1;
            self.state = desired;
            Ok(())
        }
    }

    pub(crate) struct Probes {
        pub(crate) pump: Arc<Mutex<Probe>>,
        pub(crate) fan: Arc<Mutex<Probe>>,
        pub(crate) lamp: Arc<Mutex<Probe>>,
        pub(crate) shelter: Arc<Mutex<Probe>>,
    }

    pub(crate) fn fake_bank() -> (ActuatorBank, Probes) {
        let (pump, p) = Fake::new("pump", Power::Off);
        let (fan, f) = Fake::new("fan", Power::Off);
        let (lamp, l) = Fake::new("lamp", Power::Off);
        let (shelter, s) = Fake::new("shelter", 0u8);
        let bank = ActuatorBank::new(
            Box::new(pump),
            Box::new(fan),
            Box::new(lamp),
            Box::new(shelter),
            &ShelterConfig::default(),
        );
        (
            bank,
            Probes {
                pump: p,
                fan: f,
                lamp: l,
                shelter: s,
            },
        )
    }

    #[test]
    fn starts_in_safe_state() {
        let (bank, _) = fake_bank();
        assert_eq!(bank.state(), ActuatorState::SAFE);
    }

    #[test]
    fn apply_drives_every_actuator() {
        let (mut bank, probes) = fake_bank();
        let desired = ActuatorState {
            pump: Power::On,
            fan: Power::On,
            lamp: Power::On,
            shelter: Shelter::Closed,
        };
        assert!(bank.apply(&desired).is_empty());
        assert_eq!(bank.state(), desired);
        assert_eq!(probes.shelter.lock().unwrap().writes, 1);
    }

    #[test]
    fn apply_is_idempotent() {
        let (mut bank, probes) = fake_bank();
        let desired = ActuatorState {
            pump: Power::On,
            ..ActuatorState::SAFE
        };
        bank.apply(&desired);
        bank.apply(&desired);
        assert_eq!(probes.pump.lock().unwrap().writes, 1);
        assert_eq!(probes.fan.lock().unwrap().writes, 0);
    }

    #[test]
    fn failure_is_isolated_to_one_actuator() {
        let (mut bank, probes) = fake_bank();
        probes.pump.lock().unwrap().jammed = true;

        let desired = ActuatorState {
            pump: Power::On,
            fan: Power::On,
            ..ActuatorState::SAFE
        };
        let errors = bank.apply(&desired);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].actuator(), "pump");

        let state = bank.state();
        assert_eq!(state.pump, Power::Off);
        assert_eq!(state.fan, Power::On);
    }

    #[test]
    fn safe_state_turns_everything_off() {
        let (mut bank, probes) = fake_bank();
        bank.apply(&ActuatorState {
            pump: Power::On,
            fan: Power::On,
            lamp: Power::On,
            shelter: Shelter::Closed,
        });
        assert!(bank.safe_state().is_empty());
        assert_eq!(bank.state(), ActuatorState::SAFE);
        assert_eq!(probes.lamp.lock().unwrap().writes, 2);
    }
}
