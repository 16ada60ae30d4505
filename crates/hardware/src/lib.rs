//! Sensor and actuator capabilities for the BloomBotanics controller.
//!
//! Every physical device sits behind one of two small traits: [`Sensor`]
//! (`read()`) or [`Actuator`] (`set()`). With the `gpio` feature the real
//! Raspberry Pi drivers are compiled in; without it, relay and servo lines are
//! mocks and the [`sim`] module supplies sensor readings.

pub mod actuator;
pub mod adc;
pub mod calibration;
pub mod dht22;
pub mod error;
pub mod rain;
pub mod sensor;
pub mod sim;

pub use actuator::{Actuator, Power, RelaySwitch, Servo};
pub use error::{ActuatorError, SensorError};
pub use sensor::{ClimateReading, Sensor};
