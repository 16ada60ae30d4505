//! Relay and servo outputs. The `gpio` feature gates the real rppal driver;
//! without it, a mock line records writes so the controller can run and be
//! tested off-hardware.

use crate::error::ActuatorError;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};
#[cfg(feature = "gpio")]
use std::time::Duration;

#[cfg(not(feature = "gpio"))]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Commanded state of an on/off actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn is_on(self) -> bool {
        self == Power::On
    }
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_on() { "ON" } else { "OFF" })
    }
}

/// A controllable output. `set` is idempotent: commanding the current state
/// performs no hardware write and succeeds. On error the recorded state is
/// left unchanged.
pub trait Actuator {
    type State: Copy + PartialEq + std::fmt::Debug;

    fn name(&self) -> &str;

    fn state(&self) -> Self::State;

    fn set(&mut self, desired: Self::State) -> Result<(), ActuatorError>;
}

/// Servo PWM period (50 Hz).
pub const SERVO_PERIOD_US: u64 = 20_000;

/// Highest accepted servo angle in degrees.
pub const SERVO_MAX_ANGLE: u8 = 180;

/// Pulse width for `angle`: 0.4 ms at 0° up to 2.4 ms at 180°.
pub fn servo_pulse_us(angle: u8) -> u64 {
    400 + angle.min(SERVO_MAX_ANGLE) as u64 * 2_000 / SERVO_MAX_ANGLE as u64
}

// ---------------------------------------------------------------------------
// Real GPIO relay (production: rppal on a Raspberry Pi)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct RelaySwitch {
    name: String,
    pin: OutputPin,
    active_low: bool, // many relay boards are active-low
    state: Power,
}

#[cfg(feature = "gpio")]
impl RelaySwitch {
    pub fn new(name: &str, bcm_pin: u8, active_low: bool) -> Result<Self, ActuatorError> {
        let mut pin = Gpio::new()
            .and_then(|g| g.get(bcm_pin))
            .map_err(|e| ActuatorError::Write {
                actuator: name.to_string(),
                detail: e.to_string(),
            })?
            .into_output();

        // Fail-safe: ensure "OFF" at startup
        if active_low {
            pin.set_high();
        } else {
            pin.set_low();
        }
        tracing::info!(actuator = name, gpio = bcm_pin, active_low, "relay initialised");

        Ok(Self {
            name: name.to_string(),
            pin,
            active_low,
            state: Power::Off,
        })
    }
}

#[cfg(feature = "gpio")]
impl Actuator for RelaySwitch {
    type State = Power;

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Power {
        self.state
    }

    fn set(&mut self, desired: Power) -> Result<(), ActuatorError> {
        if desired == self.state {
            return Ok(());
        }
        // active-low relay: LOW = ON, HIGH = OFF
        let drive_high = desired.is_on() != self.active_low;
        if drive_high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.state = desired;
        tracing::info!(actuator = %self.name, state = %desired, "relay set");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock relay (development: no hardware, records writes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct RelaySwitch {
    name: String,
    line: Arc<AtomicBool>, // energised or not
    state: Power,
    writes: usize,
    jammed: bool,
}

#[cfg(not(feature = "gpio"))]
impl RelaySwitch {
    pub fn new(name: &str, bcm_pin: u8, _active_low: bool) -> Result<Self, ActuatorError> {
        tracing::info!(actuator = name, gpio = bcm_pin, "[mock-gpio] relay registered (not wired)");
        Ok(Self {
            name: name.to_string(),
            line: Arc::new(AtomicBool::new(false)),
            state: Power::Off,
            writes: 0,
            jammed: false,
        })
    }

    /// Shared view of the line level, for wiring the relay into a simulator.
    pub fn line(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.line)
    }

    /// Number of hardware writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Make every subsequent write fail until cleared.
    pub fn jam(&mut self, jammed: bool) {
        self.jammed = jammed;
    }
}

#[cfg(not(feature = "gpio"))]
impl Actuator for RelaySwitch {
    type State = Power;

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Power {
        self.state
    }

    fn set(&mut self, desired: Power) -> Result<(), ActuatorError> {
        if desired == self.state {
            return Ok(());
        }
        if self.jammed {
            return Err(ActuatorError::Write {
                actuator: self.name.clone(),
                detail: "line jammed".to_string(),
            });
        }
        self.line.store(desired.is_on(), Ordering::SeqCst);
        self.state = desired;
        self.writes += 1;
        tracing::info!(actuator = %self.name, state = %desired, "[mock-gpio] relay set");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Servo
// ---------------------------------------------------------------------------

fn check_angle(name: &str, angle: u8) -> Result<(), ActuatorError> {
    if angle > SERVO_MAX_ANGLE {
        return Err(ActuatorError::InvalidCommand {
            actuator: name.to_string(),
            detail: format!("angle {angle} exceeds {SERVO_MAX_ANGLE}"),
        });
    }
    Ok(())
}

#[cfg(feature = "gpio")]
pub struct Servo {
    name: String,
    pin: OutputPin,
    angle: u8,
}

#[cfg(feature = "gpio")]
impl Servo {
    /// Claim the pin and drive the horn to `initial` degrees.
    pub fn new(name: &str, bcm_pin: u8, initial: u8) -> Result<Self, ActuatorError> {
        check_angle(name, initial)?;
        let write_err = |e: rppal::gpio::Error| ActuatorError::Write {
            actuator: name.to_string(),
            detail: e.to_string(),
        };
        let pin = Gpio::new()
            .and_then(|g| g.get(bcm_pin))
            .map_err(write_err)?
            .into_output();
        let mut servo = Self {
            name: name.to_string(),
            pin,
            angle: initial,
        };
        servo.drive(initial)?;
        tracing::info!(actuator = name, gpio = bcm_pin, angle = initial, "servo initialised");
        Ok(servo)
    }

    fn drive(&mut self, angle: u8) -> Result<(), ActuatorError> {
        self.pin
            .set_pwm(
                Duration::from_micros(SERVO_PERIOD_US),
                Duration::from_micros(servo_pulse_us(angle)),
            )
            .map_err(|e| ActuatorError::Write {
                actuator: self.name.clone(),
                detail: e.to_string(),
            })
    }
}

#[cfg(feature = "gpio")]
impl Actuator for Servo {
    type State = u8;

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> u8 {
        self.angle
    }

    fn set(&mut self, desired: u8) -> Result<(), ActuatorError> {
        check_angle(&self.name, desired)?;
        if desired == self.angle {
            return Ok(());
        }
        self.drive(desired)?;
        self.angle = desired;
        tracing::info!(actuator = %self.name, angle = desired, "servo set");
        Ok(())
    }
}

#[cfg(not(feature = "gpio"))]
pub struct Servo {
    name: String,
    angle: u8,
    writes: usize,
    jammed: bool,
}

#[cfg(not(feature = "gpio"))]
impl Servo {
    pub fn new(name: &str, bcm_pin: u8, initial: u8) -> Result<Self, ActuatorError> {
        check_angle(name, initial)?;
        tracing::info!(actuator = name, gpio = bcm_pin, angle = initial, "[mock-gpio] servo registered (not wired)");
        Ok(Self {
            name: name.to_string(),
            angle: initial,
            writes: 0,
            jammed: false,
        })
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn jam(&mut self, jammed: bool) {
        self.jammed = jammed;
    }
}

#[cfg(not(feature = "gpio"))]
impl Actuator for Servo {
    type State = u8;

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> u8 {
        self.angle
    }

    fn set(&mut self, desired: u8) -> Result<(), ActuatorError> {
        check_angle(&self.name, desired)?;
        if desired == self.angle {
            return Ok(());
        }
        if self.jammed {
            return Err(ActuatorError::Write {
                actuator: self.name.clone(),
                detail: "servo jammed".to_string(),
            });
        }
        self.angle = desired;
        self.writes += 1;
        tracing::info!(actuator = %self.name, angle = desired, "[mock-gpio] servo set");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
