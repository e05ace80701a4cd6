//! Derives the display's pixel density from its geometry.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::model::calibration::{Calibration, DisplayGeometry};

/// Source of display geometry, queried once at startup.
pub trait DisplayQuery {
    fn geometry(&self) -> Result<DisplayGeometry>;
}

/// A display whose physical diagonal is known up front.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay {
    pub width_px: u32,
    pub height_px: u32,
    pub diagonal_inches: f64,
}

impl DisplayQuery for FixedDisplay {
    fn geometry(&self) -> Result<DisplayGeometry> {
        Ok(DisplayGeometry {
            width_px: self.width_px,
            height_px: self.height_px,
            diagonal: self.diagonal_inches,
        })
    }
}

/// A display described by the DPI the windowing system reports.
/// The physical diagonal is derived from the width and height in inches.
#[derive(Debug, Clone, Copy)]
pub struct DpiDisplay {
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: f64,
}

impl DisplayQuery for DpiDisplay {
    fn geometry(&self) -> Result<DisplayGeometry> {
        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return Err(anyhow!("Display reported an invalid DPI: {}", self.dpi));
        }
        let width_in = self.width_px as f64 / self.dpi;
        let height_in = self.height_px as f64 / self.dpi;
        Ok(DisplayGeometry {
            width_px: self.width_px,
            height_px: self.height_px,
            diagonal: width_in.hypot(height_in),
        })
    }
}

/// Computes pixels per inch as `sqrt(W² + H²) / D`.
pub fn compute_density(query: &dyn DisplayQuery) -> Result<Calibration> {
    let geometry = query.geometry().context("Failed to query display geometry")?;

    if geometry.width_px == 0 || geometry.height_px == 0 {
        return Err(anyhow!(
            "Display reported an empty resolution: {}x{}",
            geometry.width_px,
            geometry.height_px
        ));
    }
    if !geometry.diagonal.is_finite() || geometry.diagonal <= 0.0 {
        return Err(anyhow!(
            "Display reported an invalid diagonal: {}",
            geometry.diagonal
        ));
    }

    let density = geometry.pixel_diagonal() / geometry.diagonal;
    Calibration::new(density).ok_or_else(|| anyhow!("Computed invalid pixel density: {}", density))
}

/// Like [`compute_density`], but falls back to `fallback_ppi` when the
/// display cannot be queried. Without a fallback the error is returned.
pub fn calibrate_or_fallback(
    query: &dyn DisplayQuery,
    fallback_ppi: Option<f64>,
) -> Result<Calibration> {
    match compute_density(query) {
        Ok(calibration) => {
            info!(
                "Calibrated display density: {:.2} px/in",
                calibration.pixels_per_unit()
            );
            Ok(calibration)
        }
        Err(err) => {
            let Some(ppi) = fallback_ppi else {
                return Err(err);
            };
            let calibration = Calibration::new(ppi)
                .ok_or_else(|| anyhow!("Invalid fallback density: {}", ppi))?;
            warn!("Display calibration failed ({:#}), using fallback {} px/in", err, ppi);
            Ok(calibration)
        }
    }
}
