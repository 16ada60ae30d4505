//! MCP3008 10-bit ADC over SPI, used for the soil moisture probes and the
//! light-dependent resistor.
//!
//! Each conversion is one 3-byte full-duplex transfer:
//!
//! ```text
//!   MOSI: 0000_0001  1 D2 D1 D0 xxxx  xxxx_xxxx
//!         start bit  single-ended + channel
//!   MISO: xxxx_xxxx  xxxx x 0 B9 B8   B7 .. B0
//! ```

#[cfg(feature = "gpio")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "gpio")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

#[cfg(feature = "gpio")]
use crate::{calibration::Calibration, error::SensorError, sensor::Sensor};

/// Highest single-ended channel index (CH0..CH7).
pub const MAX_CHANNEL: u8 = 7;

/// SPI clock for the MCP3008 at 3.3 V.
pub const SPI_CLOCK_HZ: u32 = 1_350_000;

const START_BIT: u8 = 0x01;
const SINGLE_ENDED: u8 = 0x08;

/// Build the request frame for a single-ended read on `channel`.
pub fn command_for_channel(channel: u8) -> [u8; 3] {
    [START_BIT, (SINGLE_ENDED | (channel & MAX_CHANNEL)) << 4, 0x00]
}

/// Extract the 10-bit conversion result from the response frame.
pub fn decode_response(rx: [u8; 3]) -> u16 {
    (((rx[1] & 0x03) as u16) << 8) | rx[2] as u16
}

// ---------------------------------------------------------------------------
// SPI driver (production: rppal on a Raspberry Pi)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct Mcp3008 {
    spi: Spi,
}

#[cfg(feature = "gpio")]
impl Mcp3008 {
    /// Open SPI0 / CE0.
    pub fn open() -> Result<Self, rppal::spi::Error> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)?;
        tracing::info!(clock_hz = SPI_CLOCK_HZ, "mcp3008 initialised on spi0/ce0");
        Ok(Self { spi })
    }

    pub fn read_channel(&mut self, channel: u8) -> Result<u16, rppal::spi::Error> {
        let tx = command_for_channel(channel);
        let mut rx = [0u8; 3];
        self.spi.transfer(&mut rx, &tx)?;
        Ok(decode_response(rx))
    }
}

/// One calibrated channel of a shared MCP3008, exposed as a percent sensor.
#[cfg(feature = "gpio")]
pub struct AnalogChannel {
    name: String,
    adc: Arc<Mutex<Mcp3008>>,
    channel: u8,
    calibration: Calibration,
}

#[cfg(feature = "gpio")]
impl AnalogChannel {
    pub fn new(
        name: impl Into<String>,
        adc: Arc<Mutex<Mcp3008>>,
        channel: u8,
        calibration: Calibration,
    ) -> Self {
        Self {
            name: name.into(),
            adc,
            channel,
            calibration,
        }
    }
}

#[cfg(feature = "gpio")]
impl Sensor for AnalogChannel {
    type Reading = f32;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        let raw = {
            let mut adc = self
                .adc
                .lock()
                .map_err(|_| SensorError::unavailable(&self.name, "adc lock poisoned"))?;
            adc.read_channel(self.channel)
                .map_err(|e| SensorError::unavailable(&self.name, e))?
        };
        tracing::trace!(sensor = %self.name, channel = self.channel, raw, "adc sample");
        Ok(self.calibration.percent(raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_channel_0() {
        assert_eq!(command_for_channel(0), [0x01, 0x80, 0x00]);
    }

    #[test]
    fn command_channel_1() {
        assert_eq!(command_for_channel(1), [0x01, 0x90, 0x00]);
    }

    #[test]
    fn command_channel_7() {
        assert_eq!(command_for_channel(7), [0x01, 0xF0, 0x00]);
    }

    #[test]
    fn command_masks_out_of_range_channel() {
        // Only the low three bits select the input.
        assert_eq!(command_for_channel(9), command_for_channel(1));
    }

    #[test]
    fn decode_full_scale() {
        assert_eq!(decode_response([0x00, 0x03, 0xFF]), 1023);
    }

    #[test]
    fn decode_ignores_leading_garbage_bits() {
        // Bits above B9 in the second byte are undefined on the wire.
        assert_eq!(decode_response([0xFF, 0xFE, 0x2C]), 0x22C);
    }

    #[test]
    fn decode_zero() {
        assert_eq!(decode_response([0x00, 0x00, 0x00]), 0);
    }
}
