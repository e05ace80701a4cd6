use serde::{Deserialize, Serialize};

/// Screen size as reported by the display query. `diagonal` is in inches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub width_px: u32,
    pub height_px: u32,
    pub diagonal: f64,
}

impl DisplayGeometry {
    pub fn pixel_diagonal(&self) -> f64 {
        (self.width_px as f64).hypot(self.height_px as f64)
    }
}

/// Pixel density of the display, in pixels per inch. Fixed for the
/// lifetime of the process once computed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pixels_per_unit: f64,
}

impl Calibration {
    /// Returns `None` unless `pixels_per_unit` is finite and positive.
    pub fn new(pixels_per_unit: f64) -> Option<Self> {
        if pixels_per_unit.is_finite() && pixels_per_unit > 0.0 {
            Some(Self { pixels_per_unit })
        } else {
            None
        }
    }

    pub fn pixels_per_unit(&self) -> f64 {
        self.pixels_per_unit
    }
}
