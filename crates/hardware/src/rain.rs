//! Rain detector board (comparator output on a GPIO line, LOW = wet).

/// Interpret the comparator line. The board pulls its output low when the
/// sensing pad is wet.
pub fn rain_from_line(line_high: bool) -> bool {
    !line_high
}

#[cfg(feature = "gpio")]
mod gpio {
    use rppal::gpio::{Gpio, InputPin};

    use crate::{error::SensorError, sensor::Sensor};

    pub struct RainDetector {
        name: String,
        pin: InputPin,
    }

    impl RainDetector {
        pub fn new(bcm_pin: u8) -> rppal::gpio::Result<Self> {
            let pin = Gpio::new()?.get(bcm_pin)?.into_input_pullup();
            tracing::info!(gpio = bcm_pin, "rain detector initialised");
            Ok(Self {
                name: "rain".to_string(),
                pin,
            })
        }
    }

    impl Sensor for RainDetector {
        type Reading = bool;

        fn name(&self) -> &str {
            &self.name
        }

        fn read(&mut self) -> Result<bool, SensorError> {
            Ok(super::rain_from_line(self.pin.is_high()))
        }
    }
}

#[cfg(feature = "gpio")]
pub use gpio::RainDetector;
