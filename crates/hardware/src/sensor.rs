use crate::error::SensorError;

/// A single hardware input. `read` performs one transaction and returns
/// either a typed reading or an error; no default value is ever substituted.
pub trait Sensor {
    type Reading;

    fn name(&self) -> &str;

    fn read(&mut self) -> Result<Self::Reading, SensorError>;
}

/// Temperature (°C) and relative humidity (%) from one DHT22 transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Boxed reader types used by the controller to hold a heterogeneous set of
/// devices.
pub type ClimateSensor = Box<dyn Sensor<Reading = ClimateReading> + Send>;
pub type PercentSensor = Box<dyn Sensor<Reading = f32> + Send>;
pub type SwitchSensor = Box<dyn Sensor<Reading = bool> + Send>;
