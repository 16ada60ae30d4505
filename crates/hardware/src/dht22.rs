//! DHT22 (AM2302) temperature/humidity sensor on a single GPIO line.
//!
//! The host pulls the line low for ~1 ms, releases it, and the sensor answers
//! with an 80 µs low / 80 µs high preamble followed by 40 data bits. Every bit
//! starts with ~50 µs low; the length of the following high pulse encodes the
//! value (~27 µs = 0, ~70 µs = 1).
//!
//! Frame layout: humidity (u16, ×10), temperature (sign bit + 15-bit
//! magnitude, ×10), checksum (low byte of the sum of the first four bytes).

use crate::{error::SensorError, sensor::ClimateReading};

#[cfg(feature = "gpio")]
use crate::sensor::Sensor;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, IoPin, Level, Mode, PullUpDown};
#[cfg(feature = "gpio")]
use std::{
    thread,
    time::{Duration, Instant},
};

/// Data bits per transaction.
pub const FRAME_BITS: usize = 40;

/// High pulses longer than this are a `1` bit.
pub const ONE_THRESHOLD_US: u32 = 50;

const HUMIDITY_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = -40.0..=80.0;

/// Pack 40 measured high-pulse widths into the 5-byte frame, MSB first.
pub fn pulses_to_frame(high_us: &[u32; FRAME_BITS]) -> [u8; 5] {
    let mut frame = [0u8; 5];
    for (i, &width) in high_us.iter().enumerate() {
        if width > ONE_THRESHOLD_US {
            frame[i / 8] |= 0x80 >> (i % 8);
        }
    }
    frame
}

/// Validate the checksum and convert a frame to physical units.
pub fn decode_frame(sensor: &str, frame: [u8; 5]) -> Result<ClimateReading, SensorError> {
    let expected = frame[..4]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    if expected != frame[4] {
        return Err(SensorError::Checksum {
            sensor: sensor.to_string(),
            expected,
            actual: frame[4],
        });
    }

    let humidity_pct = u16::from_be_bytes([frame[0], frame[1]]) as f32 / 10.0;
    let raw_t = u16::from_be_bytes([frame[2], frame[3]]);
    let magnitude = (raw_t & 0x7FFF) as f32 / 10.0;
    let temperature_c = if raw_t & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    };

    if !HUMIDITY_RANGE.contains(&humidity_pct) {
        return Err(SensorError::OutOfRange {
            sensor: sensor.to_string(),
            value: humidity_pct,
        });
    }
    if !TEMPERATURE_RANGE.contains(&temperature_c) {
        return Err(SensorError::OutOfRange {
            sensor: sensor.to_string(),
            value: temperature_c,
        });
    }

    Ok(ClimateReading {
        temperature_c,
        humidity_pct,
    })
}

// ---------------------------------------------------------------------------
// GPIO driver (production: rppal on a Raspberry Pi)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct Dht22 {
    name: String,
    pin: IoPin,
}

#[cfg(feature = "gpio")]
impl Dht22 {
    pub fn new(bcm_pin: u8) -> rppal::gpio::Result<Self> {
        let mut pin = Gpio::new()?.get(bcm_pin)?.into_io(Mode::Input);
        pin.set_pullupdown(PullUpDown::PullUp);
        tracing::info!(gpio = bcm_pin, "dht22 initialised");
        Ok(Self {
            name: "dht22".to_string(),
            pin,
        })
    }

    /// Busy-wait until the line reaches `level`; returns the time spent.
    fn wait_for(&self, level: Level, timeout_us: u32, stage: &'static str) -> Result<u32, SensorError> {
        let start = Instant::now();
        let timeout = Duration::from_micros(timeout_us as u64);
        while self.pin.read() != level {
            if start.elapsed() > timeout {
                return Err(SensorError::Timeout {
                    sensor: self.name.clone(),
                    stage,
                });
            }
        }
        Ok(start.elapsed().as_micros() as u32)
    }

    fn capture(&mut self) -> Result<[u32; FRAME_BITS], SensorError> {
        // Start signal.
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        thread::sleep(Duration::from_micros(1_100));
        self.pin.set_mode(Mode::Input);
        self.pin.set_pullupdown(PullUpDown::PullUp);

        // Preamble: sensor pulls low, then high, then low for the first bit.
        self.wait_for(Level::Low, 200, "response")?;
        self.wait_for(Level::High, 120, "response high")?;
        self.wait_for(Level::Low, 120, "first bit")?;

        let mut widths = [0u32; FRAME_BITS];
        for width in widths.iter_mut() {
            self.wait_for(Level::High, 100, "bit start")?;
            *width = self.wait_for(Level::Low, 120, "bit end")?;
        }
        Ok(widths)
    }
}

#[cfg(feature = "gpio")]
impl Sensor for Dht22 {
    type Reading = ClimateReading;

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<ClimateReading, SensorError> {
        let widths = self.capture()?;
        decode_frame(&self.name, pulses_to_frame(&widths))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
