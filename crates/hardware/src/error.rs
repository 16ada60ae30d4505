use thiserror::Error;

/// A failed hardware read. The caller must treat the reading as unknown.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("{sensor}: device unavailable: {detail}")]
    Unavailable { sensor: String, detail: String },

    #[error("{sensor}: timed out waiting for {stage}")]
    Timeout { sensor: String, stage: &'static str },

    #[error("{sensor}: checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    Checksum {
        sensor: String,
        expected: u8,
        actual: u8,
    },

    #[error("{sensor}: implausible value {value}")]
    OutOfRange { sensor: String, value: f32 },
}

impl SensorError {
    pub fn unavailable(sensor: &str, detail: impl ToString) -> Self {
        Self::Unavailable {
            sensor: sensor.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Name of the sensor that produced the error.
    pub fn sensor(&self) -> &str {
        match self {
            Self::Unavailable { sensor, .. }
            | Self::Timeout { sensor, .. }
            | Self::Checksum { sensor, .. }
            | Self::OutOfRange { sensor, .. } => sensor,
        }
    }
}

/// A failed actuator command. The actuator's recorded state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("{actuator}: write failed: {detail}")]
    Write { actuator: String, detail: String },

    #[error("{actuator}: invalid command: {detail}")]
    InvalidCommand { actuator: String, detail: String },
}

impl ActuatorError {
    pub fn actuator(&self) -> &str {
        match self {
            Self::Write { actuator, .. } | Self::InvalidCommand { actuator, .. } => actuator,
        }
    }
}
