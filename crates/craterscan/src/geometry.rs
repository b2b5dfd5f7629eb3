//! Tile-to-stage coordinate transform and anisotropic axis correction.
//!
//! The upstream ellipse fit runs in a coordinate system whose x and y
//! physical scales differ. [`correct_axes`] re-parameterizes the fitted
//! conic in the physically isotropic frame and recovers the true semi-axes.

use std::fmt;

use crate::config::Calibration;
use crate::scan::{RawRecord, ScanHeader};

/// Stage-frame position of one record: tile origin plus tile placement plus
/// scaled intra-tile offset.
pub fn absolute_position(header: &ScanHeader, cal: &Calibration, rec: &RawRecord) -> [f64; 2] {
    let x = header.origin_x
        + rec.tile_x as f64 * header.tile_increment_x(cal)
        + rec.local_u / header.scale_x;
    let y = header.origin_y
        + rec.tile_y as f64 * header.tile_increment_y(cal)
        + rec.local_v / header.scale_y;
    [x, y]
}

/// Total scanned physical area: the tile spans plus one acceptance window.
pub fn scanned_area(header: &ScanHeader, cal: &Calibration) -> f64 {
    let l1 = header.tile_count_x as f64 * header.tile_increment_x(cal)
        + cal.frame_window_x.width() / header.scale_x.abs();
    let l2 = header.tile_count_y as f64 * header.tile_increment_y(cal)
        + cal.frame_window_y.width() / header.scale_y;
    l1 * l2
}

/// Physical-unit semi-axes recovered from an anisotropic-frame fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedAxes {
    /// Semi-major axis, physical units. Always `>= minor`.
    pub major: f64,
    /// Semi-minor axis, physical units. Always `> 0`.
    pub minor: f64,
}

impl CorrectedAxes {
    /// Ellipse area π·a·b, physical units².
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.major * self.minor
    }
}

/// Fit parameters outside their valid domain; the axes cannot be recovered.
///
/// Surfaced per record so a run can skip the offender and keep the rest of
/// the population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegenerateGeometry {
    pub minor_axis: f64,
    pub eccentricity: f64,
    pub rotation_sine: f64,
}

impl fmt::Display for DegenerateGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degenerate ellipse fit: b={}, e={}, sin(phi)={}",
            self.minor_axis, self.eccentricity, self.rotation_sine
        )
    }
}

impl std::error::Error for DegenerateGeometry {}

/// Recover the true semi-axes from the fitted minor axis `b`, eccentricity
/// `e = b/a` and rotation sine, compensating for the unequal x/y scales.
///
/// The fitted ellipse is rewritten as a conic in the corrected frame; its
/// principal-axis lengths follow from the conic eigenvalues
/// `(r + s ∓ sqrt((r − s)² + 4t²)) / 2`.
///
/// For any geometrically valid input (`b > 0`, `0 < e <= 1`, `|sin(phi)| <= 1`)
/// the result satisfies `major >= minor > 0`.
pub fn correct_axes(
    minor_axis: f64,
    eccentricity: f64,
    rotation_sine: f64,
    scale_x: f64,
    scale_y: f64,
) -> Result<CorrectedAxes, DegenerateGeometry> {
    let degenerate = DegenerateGeometry {
        minor_axis,
        eccentricity,
        rotation_sine,
    };
    if !(minor_axis > 0.0) || !(eccentricity > 0.0) || !(rotation_sine.abs() <= 1.0) {
        return Err(degenerate);
    }

    let b = minor_axis;
    let a = b / eccentricity;
    let phi = rotation_sine.asin();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let q = (scale_y / scale_x).abs();

    let inv_a2 = 1.0 / (a * a);
    let inv_b2 = 1.0 / (b * b);
    let cos2 = cos_phi * cos_phi;
    let sin2 = sin_phi * sin_phi;

    let r = q * (cos2 * inv_a2 + sin2 * inv_b2);
    let s = (cos2 * inv_b2 + sin2 * inv_a2) / q;
    let t = (inv_a2 - inv_b2) * sin_phi * cos_phi;

    let disc = ((r - s) * (r - s) + 4.0 * t * t).sqrt();
    let scale = q.sqrt() / scale_x.abs();
    let major = (2.0 / (r + s - disc)).sqrt() * scale;
    let minor = (2.0 / (r + s + disc)).sqrt() * scale;

    if !major.is_finite() || !minor.is_finite() {
        return Err(degenerate);
    }
    Ok(CorrectedAxes { major, minor })
}
