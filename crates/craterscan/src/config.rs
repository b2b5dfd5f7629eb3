//! Per-run configuration: cut thresholds, dedup policy, instrument
//! calibration and histogram binning.
//!
//! Everything here is immutable for the duration of one run. The interactive
//! surface that lets an operator pick thresholds lives outside this crate;
//! it hands over a fully-formed [`RunConfig`] per invocation.

use serde::{Deserialize, Serialize};

/// Inclusive acceptance range for one cut axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Duplicate-suppression policy for features re-detected in tile overlap.
///
/// The three modes are mutually exclusive; there is no combination where
/// both the edge check and the total check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// No proximity check; every record enters the population.
    #[default]
    None,
    /// Check only records whose local offset falls inside the tile-overlap
    /// margin; interior records are accepted without a scan.
    EdgeOnly,
    /// Check every record against all previously seen positions.
    Total,
}

/// Instrument constants taken from the scanner's parameter file.
///
/// These are calibration values, not derived from the scan header. The tile
/// increments written into the header are recomputed from this block and the
/// header scale factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Tile side length, pixels.
    pub tile_size_px: f64,
    /// Tile overlap along x, pixels.
    pub overlap_x_px: f64,
    /// Tile overlap along y, pixels.
    pub overlap_y_px: f64,
    /// Video-frame acceptance window along x, pixels, centered on the tile.
    pub frame_window_x: Range,
    /// Video-frame acceptance window along y, pixels, centered on the tile.
    pub frame_window_y: Range,
    /// Header/footer artifacts included in the instrument's declared record
    /// count; subtracted before filter-level reporting.
    pub declared_count_bias: i64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            tile_size_px: 1024.0,
            overlap_x_px: 60.0,
            overlap_y_px: 60.0,
            frame_window_x: Range::new(-482.0, 482.0),
            frame_window_y: Range::new(-482.0, 482.0),
            declared_count_bias: 3,
        }
    }
}

impl Calibration {
    /// Half a tile side; local offsets are centered on the tile.
    pub fn half_tile_px(&self) -> f64 {
        self.tile_size_px * 0.5
    }
}

/// Acceptance thresholds for the four cut criteria.
///
/// Position is one criterion tested jointly over x and y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutThresholds {
    /// Absolute stage position, x [µm].
    pub position_x: Range,
    /// Absolute stage position, y [µm].
    pub position_y: Range,
    /// Corrected semi-minor axis [µm].
    pub minor_axis: Range,
    /// Eccentricity b/a, dimensionless.
    pub eccentricity: Range,
    /// Calculated ellipse area [µm²].
    pub area: Range,
}

impl Default for CutThresholds {
    fn default() -> Self {
        Self {
            position_x: Range::new(0.0, 140_000.0),
            position_y: Range::new(0.0, 140_000.0),
            minor_axis: Range::new(0.0, 4.0),
            eccentricity: Range::new(0.0, 1.0),
            area: Range::new(0.0, 40.0),
        }
    }
}

impl CutThresholds {
    /// Area of the spatial acceptance window [µm²].
    pub fn window_area(&self) -> f64 {
        self.position_x.width() * self.position_y.width()
    }
}

/// Binning for one histogram axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub bins: usize,
    pub lo: f64,
    pub hi: f64,
}

impl BinSpec {
    pub fn new(bins: usize, lo: f64, hi: f64) -> Self {
        Self { bins, lo, hi }
    }
}

/// Binning of the aggregated distributions. Presentation configuration; the
/// core fills whatever grid it is given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBinning {
    /// Shared by the x and y axes of the 2D position histograms.
    pub position: BinSpec,
    pub minor_axis: BinSpec,
    pub eccentricity: BinSpec,
    /// Shared by the enclosed-area and calculated-area histograms.
    pub area: BinSpec,
}

impl Default for HistogramBinning {
    fn default() -> Self {
        Self {
            position: BinSpec::new(1400, -50.0, 139_950.0),
            minor_axis: BinSpec::new(100, -0.02, 3.98),
            eccentricity: BinSpec::new(220, -0.0025, 1.0975),
            area: BinSpec::new(100, -0.2, 39.8),
        }
    }
}

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub cuts: CutThresholds,
    pub dedup: DedupMode,
    /// Subtract the estimated uniform background from the filtered count.
    pub underground_correction: bool,
    pub calibration: Calibration,
    pub binning: HistogramBinning,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cuts: CutThresholds::default(),
            dedup: DedupMode::None,
            underground_correction: true,
            calibration: Calibration::default(),
            binning: HistogramBinning::default(),
        }
    }
}
