//! craterscan — crater population statistics from tiled microscope scans.
//!
//! The scanning instrument emits one whitespace-delimited record per detected
//! roughly-elliptical feature ("crater"), in local tile coordinates. This
//! crate turns a scan result file into a deduplicated, cut-classified and
//! statistically characterized population in absolute stage coordinates.
//! The pipeline stages are:
//!
//! 1. **Scan**: two-part header parsing plus a lazy, forward-only record
//!    iterator over the scan file.
//! 2. **Geometry**: tile-local to stage-absolute coordinate transform and
//!    anisotropic-scale correction of the fitted ellipse axes.
//! 3. **Dedup**: suppression of features re-detected in the overlap band of
//!    adjacent tiles.
//! 4. **Classify**: four independent inclusive-range acceptance cuts
//!    (position, minor axis, eccentricity, area).
//! 5. **Stats**: uniform-background ("underground") estimate and
//!    point-biserial correlations between rejection indicators.
//! 6. **Aggregate**: binned distributions and scalar run results for the
//!    presentation layer.
//!
//! # Public API
//! - [`analyze_file`] / [`analyze`] as primary entry points
//! - [`RunConfig`] with [`CutThresholds`], [`DedupMode`] and instrument
//!   [`Calibration`] as per-run configuration
//! - [`RunResult`] carrying counts, correlation coefficients and histograms
//!   exposed as bin center/count pairs

pub mod classify;
pub mod config;
pub mod dedup;
pub mod geometry;
pub mod histogram;
pub mod pipeline;
pub mod scan;
pub mod stats;

pub use config::{
    BinSpec, Calibration, CutThresholds, DedupMode, HistogramBinning, Range, RunConfig,
};
pub use pipeline::{analyze, analyze_file, FilterLevels, HistogramSet, RunResult};
pub use scan::{RawRecord, ScanError, ScanHeader, ScanReader};
