//! Statistical primitives: point-biserial correlation between rejection
//! indicators and the uniform-background ("underground") estimate.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Correlation ────────────────────────────────────────────────────────────

/// A correlation is undefined when an indicator has zero variance, i.e. a
/// criterion that rejected none or all of the population.
///
/// Reported explicitly instead of coercing the coefficient to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndeterminateCorrelation {
    /// First indicator is constant over the population.
    pub lhs_constant: bool,
    /// Second indicator is constant over the population.
    pub rhs_constant: bool,
}

impl fmt::Display for IndeterminateCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let which = match (self.lhs_constant, self.rhs_constant) {
            (true, true) => "both indicators are",
            (true, false) => "first indicator is",
            _ => "second indicator is",
        };
        write!(f, "correlation undefined: {} constant (zero variance)", which)
    }
}

impl std::error::Error for IndeterminateCorrelation {}

/// Point-biserial correlation between two boolean indicator sequences:
///
/// ```text
/// r = (Σxy/n − (Σx/n)(Σy/n)) / (σ_x · σ_y)
/// ```
///
/// with `σ² = Σx²/n − (Σx/n)²`; for 0/1 indicators `Σx² = Σx`. Symmetric in
/// its arguments.
pub fn point_biserial(xs: &[bool], ys: &[bool]) -> Result<f64, IndeterminateCorrelation> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len() as f64;
    let sx = xs.iter().filter(|&&x| x).count() as f64;
    let sy = ys.iter().filter(|&&y| y).count() as f64;
    let sxy = xs.iter().zip(ys).filter(|&(&x, &y)| x && y).count() as f64;

    let (mx, my) = (sx / n, sy / n);
    let var_x = mx - mx * mx;
    let var_y = my - my * my;
    if xs.is_empty() || var_x <= 0.0 || var_y <= 0.0 {
        return Err(IndeterminateCorrelation {
            lhs_constant: xs.is_empty() || var_x <= 0.0,
            rhs_constant: ys.is_empty() || var_y <= 0.0,
        });
    }
    Ok((sxy / n - mx * my) / (var_x.sqrt() * var_y.sqrt()))
}

// ── Underground ────────────────────────────────────────────────────────────

/// Uniform-background estimate derived from features that pass every cut
/// except position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UndergroundEstimate {
    /// Shape-accepted features found outside the spatial window (`K_v`).
    pub outside_count: u64,
    /// Scanned area outside the window [µm²].
    pub outside_area: f64,
    /// Background density outside the window [1/µm²].
    pub density: f64,
    /// Expected background count inside the window (`K_ua`), truncated
    /// toward zero like the legacy integer arithmetic.
    pub inside_background: i64,
}

/// Estimate the in-window background count assuming spatially uniform
/// contamination. Returns `None` when the outside-window area is zero or
/// non-finite and no density can be formed.
pub fn estimate_underground(
    outside_count: u64,
    scanned_area: f64,
    window_area: f64,
) -> Option<UndergroundEstimate> {
    let outside_area = scanned_area - window_area;
    if outside_area == 0.0 || !outside_area.is_finite() {
        return None;
    }
    let density = outside_count as f64 / outside_area;
    Some(UndergroundEstimate {
        outside_count,
        outside_area,
        density,
        inside_background: (density * window_area) as i64,
    })
}
