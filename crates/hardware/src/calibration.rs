//! Linear raw-to-percent conversion for analog channels.

/// Full-scale reading of the MCP3008 (10-bit).
pub const ADC_MAX: u16 = 1023;

/// Two-point calibration for an analog channel: the raw value that means 0 %
/// and the raw value that means 100 %. Either end may be the larger one, so a
/// capacitive soil probe (dry = high raw) and an LDR divider (bright = high
/// raw) share the same conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub raw_at_zero: u16,
    pub raw_at_full: u16,
}

impl Calibration {
    /// Soil moisture probe: `raw_dry` reads as 0 %, `raw_wet` as 100 %.
    pub fn soil(raw_dry: u16, raw_wet: u16) -> Self {
        Self {
            raw_at_zero: raw_dry,
            raw_at_full: raw_wet,
        }
    }

    /// Plain 0..=ADC_MAX mapping, used for the light-dependent resistor.
    pub fn full_scale() -> Self {
        Self {
            raw_at_zero: 0,
            raw_at_full: ADC_MAX,
        }
    }

    /// Convert a raw reading to 0.0..=100.0. Out-of-range readings are
    /// clamped; a degenerate calibration (both ends equal) yields 0.
    pub fn percent(&self, raw: u16) -> f32 {
        let span = self.raw_at_full as f64 - self.raw_at_zero as f64;
        if span == 0.0 {
            return 0.0;
        }
        let p = (raw as f64 - self.raw_at_zero as f64) / span * 100.0;
        p.clamp(0.0, 100.0) as f32
    }
}
