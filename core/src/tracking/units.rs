use serde::{Deserialize, Serialize};

/// Physical unit the ledger is recorded in. Calibration is per inch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Metres,
    Centimetres,
    Inches,
    Feet,
}

impl DistanceUnit {
    /// Length of one inch in this unit.
    pub fn per_inch(self) -> f64 {
        match self {
            DistanceUnit::Metres => 0.0254,
            DistanceUnit::Centimetres => 2.54,
            DistanceUnit::Inches => 1.0,
            DistanceUnit::Feet => 1.0 / 12.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            DistanceUnit::Metres => "m",
            DistanceUnit::Centimetres => "cm",
            DistanceUnit::Inches => "in",
            DistanceUnit::Feet => "ft",
        }
    }
}

impl std::str::FromStr for DistanceUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "m" | "metre" | "metres" | "meter" | "meters" => Ok(DistanceUnit::Metres),
            "cm" | "centimetre" | "centimetres" | "centimeter" | "centimeters" => {
                Ok(DistanceUnit::Centimetres)
            }
            "in" | "inch" | "inches" => Ok(DistanceUnit::Inches),
            "ft" | "foot" | "feet" => Ok(DistanceUnit::Feet),
            _ => Err(anyhow::anyhow!("Unknown distance unit: {}", s)),
        }
    }
}

/// Converts a pixel distance to `unit` given a density in pixels per inch.
pub fn to_physical(pixels: f64, pixels_per_unit: f64, unit: DistanceUnit) -> f64 {
    debug_assert!(pixels_per_unit > 0.0, "pixel density must be positive");
    pixels / pixels_per_unit * unit.per_inch()
}
