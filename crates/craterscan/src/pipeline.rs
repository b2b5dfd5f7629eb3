//! One-shot analysis run: drain the scan file, build the deduplicated
//! population, classify it, and finalize the aggregate statistics.
//!
//! A run either completes with a [`RunResult`] or fails cleanly on an
//! unreadable header; nothing survives the run boundary except the result
//! handed to the caller.

use std::io::BufRead;
use std::path::Path;

use serde::Serialize;

use crate::classify::{Classifier, CriterionCounts};
use crate::config::{HistogramBinning, RunConfig};
use crate::dedup::Deduplicator;
use crate::geometry;
use crate::histogram::{Hist1d, Hist2d};
use crate::scan::{ScanError, ScanHeader, ScanReader};
use crate::stats::{self, UndergroundEstimate};

/// The aggregated distributions of one run. The `_cut` variants hold only
/// features accepted by all four criteria.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSet {
    pub position: Hist2d,
    pub position_cut: Hist2d,
    pub minor_axis: Hist1d,
    pub minor_axis_cut: Hist1d,
    pub eccentricity: Hist1d,
    pub eccentricity_cut: Hist1d,
    /// Enclosed (pixel-derived) area; recorded unfiltered only.
    pub enclosed_area: Hist1d,
    pub calculated_area: Hist1d,
    pub calculated_area_cut: Hist1d,
}

impl HistogramSet {
    fn new(binning: &HistogramBinning) -> Self {
        Self {
            position: Hist2d::new(&binning.position, &binning.position),
            position_cut: Hist2d::new(&binning.position, &binning.position),
            minor_axis: Hist1d::new(&binning.minor_axis),
            minor_axis_cut: Hist1d::new(&binning.minor_axis),
            eccentricity: Hist1d::new(&binning.eccentricity),
            eccentricity_cut: Hist1d::new(&binning.eccentricity),
            enclosed_area: Hist1d::new(&binning.area),
            calculated_area: Hist1d::new(&binning.area),
            calculated_area_cut: Hist1d::new(&binning.area),
        }
    }
}

/// Per-criterion rejection report: how many of the instrument's declared
/// records (less the header/footer bias) each cut removes on its own.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FilterLevels {
    pub position: i64,
    pub axis: i64,
    pub eccentricity: i64,
    pub area: i64,
    /// Declared count minus the final filtered count.
    pub total: i64,
}

/// Everything one analysis run produces. Created fresh per invocation and
/// never merged across runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub header: ScanHeader,
    /// Population size after dedup and degenerate-record skips.
    pub unfiltered_count: u64,
    /// Features accepted by all four cuts, before background subtraction.
    pub accepted_count: u64,
    /// Final count after the optional underground subtraction.
    pub filtered_count: i64,
    /// Total scanned physical area [µm²].
    pub scanned_area: f64,
    pub duplicates_suppressed: u64,
    pub degenerate_skipped: u64,
    /// The record stream ended on a partial or malformed trailing line.
    pub truncated_tail: bool,
    pub criterion_counts: CriterionCounts,
    pub filter_levels: FilterLevels,
    /// Correlation eccentricity-rejected vs area-rejected; `None` when
    /// indeterminate (zero-variance indicator).
    pub r_ea: Option<f64>,
    /// Correlation eccentricity-rejected vs axis-rejected.
    pub r_eb: Option<f64>,
    /// Correlation area-rejected vs axis-rejected.
    pub r_ab: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underground: Option<UndergroundEstimate>,
    pub histograms: HistogramSet,
}

/// Open a scan file and run the full pipeline over it.
///
/// A missing file is reported to the caller; the process is never taken
/// down by a failed run.
pub fn analyze_file(path: impl AsRef<Path>, config: &RunConfig) -> Result<RunResult, ScanError> {
    let reader = ScanReader::open(path.as_ref())?;
    Ok(analyze(reader, config))
}

/// Run the full pipeline over an already-opened scan stream.
///
/// Single-threaded and synchronous; the stream is drained completely before
/// the aggregate statistics are finalized.
pub fn analyze<R: BufRead>(reader: ScanReader<R>, config: &RunConfig) -> RunResult {
    let header = *reader.header();
    let cal = &config.calibration;

    let mut histograms = HistogramSet::new(&config.binning);
    let mut dedup = Deduplicator::new(config.dedup, cal);
    let mut classifier = Classifier::new(config.cuts);

    // Rejection indicators over the unfiltered population, for the
    // correlation coefficients.
    let mut ecc_rejected: Vec<bool> = Vec::new();
    let mut area_rejected: Vec<bool> = Vec::new();
    let mut axis_rejected: Vec<bool> = Vec::new();

    let mut unfiltered: u64 = 0;
    let mut degenerate_skipped: u64 = 0;
    // Shape-accepted features outside the position window (K_v).
    let mut outside_window: u64 = 0;

    let area_conversion = 1.0 / (header.scale_x.abs() * header.scale_y);

    let mut records = reader.records();
    for rec in records.by_ref() {
        let pos = geometry::absolute_position(&header, cal, &rec);
        if !dedup.admit(pos, rec.local_u, rec.local_v) {
            continue;
        }

        let axes = match geometry::correct_axes(
            rec.minor_axis,
            rec.eccentricity,
            rec.rotation_sine,
            header.scale_x,
            header.scale_y,
        ) {
            Ok(axes) => axes,
            Err(fault) => {
                tracing::warn!("skipping record: {fault}");
                degenerate_skipped += 1;
                continue;
            }
        };

        unfiltered += 1;
        let calculated_area = axes.area();
        let enclosed_area = rec.enclosed_area * area_conversion;

        histograms.position.fill(pos[0], pos[1]);
        histograms.minor_axis.fill(axes.minor);
        histograms.eccentricity.fill(rec.eccentricity);
        histograms.enclosed_area.fill(enclosed_area);
        histograms.calculated_area.fill(calculated_area);

        let flags = classifier.classify(
            pos[0],
            pos[1],
            axes.minor,
            rec.eccentricity,
            calculated_area,
        );

        if !flags.position_ok && flags.axis_ok && flags.eccentricity_ok && flags.area_ok {
            outside_window += 1;
        }

        ecc_rejected.push(!flags.eccentricity_ok);
        area_rejected.push(!flags.area_ok);
        axis_rejected.push(!flags.axis_ok);

        if flags.accepted() {
            histograms.position_cut.fill(pos[0], pos[1]);
            histograms.minor_axis_cut.fill(axes.minor);
            histograms.eccentricity_cut.fill(rec.eccentricity);
            histograms.calculated_area_cut.fill(calculated_area);
        }
    }

    let truncated_tail = records.truncated();
    if truncated_tail {
        tracing::debug!("trailing partial record discarded");
    }

    finalize(
        header,
        config,
        histograms,
        classifier,
        unfiltered,
        degenerate_skipped,
        dedup.suppressed(),
        truncated_tail,
        outside_window,
        &ecc_rejected,
        &area_rejected,
        &axis_rejected,
    )
}

#[allow(clippy::too_many_arguments)]
fn finalize(
    header: ScanHeader,
    config: &RunConfig,
    histograms: HistogramSet,
    classifier: Classifier,
    unfiltered: u64,
    degenerate_skipped: u64,
    duplicates_suppressed: u64,
    truncated_tail: bool,
    outside_window: u64,
    ecc_rejected: &[bool],
    area_rejected: &[bool],
    axis_rejected: &[bool],
) -> RunResult {
    let scanned_area = geometry::scanned_area(&header, &config.calibration);

    let correlate = |name: &str, xs: &[bool], ys: &[bool]| match stats::point_biserial(xs, ys) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!("{name} indeterminate: {e}");
            None
        }
    };
    let r_ea = correlate("r_EA", ecc_rejected, area_rejected);
    let r_eb = correlate("r_EB", ecc_rejected, axis_rejected);
    let r_ab = correlate("r_AB", area_rejected, axis_rejected);

    let accepted = classifier.accepted();
    let mut filtered = accepted as i64;
    let mut underground = None;
    if config.underground_correction {
        match stats::estimate_underground(outside_window, scanned_area, config.cuts.window_area())
        {
            Some(est) => {
                // Absolute value: legacy behavior guarding against a negative
                // outside-window area flipping the correction's sign.
                filtered -= est.inside_background.abs();
                underground = Some(est);
            }
            None => {
                tracing::warn!("underground correction skipped: degenerate outside-window area")
            }
        }
    }

    let declared = header.record_count - config.calibration.declared_count_bias;
    let counts = classifier.counts();
    let filter_levels = FilterLevels {
        position: declared - counts.position as i64,
        axis: declared - counts.axis as i64,
        eccentricity: declared - counts.eccentricity as i64,
        area: declared - counts.area as i64,
        total: declared - filtered,
    };

    tracing::info!(
        unfiltered,
        accepted,
        filtered,
        duplicates_suppressed,
        degenerate_skipped,
        "run complete"
    );

    RunResult {
        header,
        unfiltered_count: unfiltered,
        accepted_count: accepted,
        filtered_count: filtered,
        scanned_area,
        duplicates_suppressed,
        degenerate_skipped,
        truncated_tail,
        criterion_counts: counts,
        filter_levels,
        r_ea,
        r_eb,
        r_ab,
        underground,
        histograms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CutThresholds, DedupMode, Range};
    use std::io::Cursor;

    /// Minimal scan text: unit scales, single tile, origin (0, 0).
    fn scan_text(record_count: i64, records: &[&str]) -> String {
        let mut text = format!(
            "{} 1 1 128 128 t t t t\n0 0 0 0 0 0 0 0 0 0\n",
            record_count
        );
        for r in records {
            text.push_str(r);
            text.push('\n');
        }
        text
    }

    fn run(text: &str, config: &RunConfig) -> RunResult {
        let reader = ScanReader::new(Cursor::new(text.as_bytes())).unwrap();
        analyze(reader, config)
    }

    fn wide_open_config() -> RunConfig {
        RunConfig {
            cuts: CutThresholds {
                position_x: Range::new(-1_000.0, 1_000.0),
                position_y: Range::new(-1_000.0, 1_000.0),
                minor_axis: Range::new(0.0, 100.0),
                eccentricity: Range::new(0.0, 1.0),
                area: Range::new(0.0, 10_000.0),
            },
            dedup: DedupMode::None,
            underground_correction: false,
            ..RunConfig::default()
        }
    }

    #[test]
    fn total_dedup_collapses_identical_records() {
        let rec = "0 0 0 0 1 1 0 1 0 0";
        let text = scan_text(3, &[rec, rec, rec]);
        let config = RunConfig {
            dedup: DedupMode::Total,
            ..wide_open_config()
        };
        let result = run(&text, &config);
        assert_eq!(result.unfiltered_count, 1);
        assert_eq!(result.duplicates_suppressed, 2);
    }

    #[test]
    fn all_pass_without_underground_keeps_classifier_count() {
        let text = scan_text(
            2,
            &["0 0 0 0 1 1 0 1 0 0", "0 0 100 -50 0.5 0.8 0.2 2 0 0"],
        );
        let result = run(&text, &wide_open_config());
        assert_eq!(result.unfiltered_count, 2);
        assert_eq!(result.accepted_count, 2);
        assert_eq!(result.filtered_count, 2);
        assert!(result.underground.is_none());
    }

    #[test]
    fn degenerate_eccentricity_is_skipped_not_propagated() {
        let text = scan_text(2, &["0 0 0 0 1 0 0 1 0 0", "0 0 10 10 1 1 0 1 0 0"]);
        let result = run(&text, &wide_open_config());
        assert_eq!(result.degenerate_skipped, 1);
        assert_eq!(result.unfiltered_count, 1);
        // Nothing non-finite reached the axis histogram.
        assert_eq!(result.histograms.minor_axis.entries(), 1);
    }

    #[test]
    fn circular_unit_scale_round_trip() {
        // e = 1, sphi = 0, scales 1: corrected axis equals the fitted one.
        let text = scan_text(1, &["0 0 0 0 1.5 1 0 1 0 0"]);
        let result = run(&text, &wide_open_config());
        let h = &result.histograms.minor_axis;
        // 1.5 lands in the in-range bucket containing 1.5.
        let bucket = (0..h.counts().len())
            .find(|&i| h.counts()[i] > 0)
            .unwrap();
        let center = h.bin_center(bucket);
        assert!((center - 1.5).abs() <= h.bin_width() / 2.0 + 1e-12);
    }

    #[test]
    fn truncated_tail_keeps_complete_records() {
        let mut text = scan_text(3, &["0 0 0 0 1 1 0 1 0 0", "0 0 10 10 1 1 0 1 0 0"]);
        text.push_str("0 0 20 20 1\n"); // partial trailing line
        let result = run(&text, &wide_open_config());
        assert!(result.truncated_tail);
        assert_eq!(result.unfiltered_count, 2);
    }

    #[test]
    fn correlations_are_indeterminate_when_nothing_is_rejected() {
        let text = scan_text(1, &["0 0 0 0 1 1 0 1 0 0"]);
        let result = run(&text, &wide_open_config());
        assert_eq!(result.r_ea, None);
        assert_eq!(result.r_eb, None);
        assert_eq!(result.r_ab, None);
    }

    #[test]
    fn correlated_rejections_produce_coefficients() {
        // Two craters rejected by both axis and area cuts, two accepted:
        // indicators coincide, so every pair correlates at +1 except the
        // eccentricity pairs (eccentricity never rejects here).
        let config = RunConfig {
            cuts: CutThresholds {
                position_x: Range::new(-1_000.0, 1_000.0),
                position_y: Range::new(-1_000.0, 1_000.0),
                minor_axis: Range::new(0.0, 2.0),
                eccentricity: Range::new(0.0, 1.0),
                area: Range::new(0.0, 15.0),
            },
            dedup: DedupMode::None,
            underground_correction: false,
            ..RunConfig::default()
        };
        let text = scan_text(
            4,
            &[
                "0 0 0 0 1 1 0 1 0 0",
                "0 0 10 0 1 1 0 1 0 0",
                "0 0 20 0 3 1 0 1 0 0", // axis 3 out of range, area 9π > 15
                "0 0 30 0 4 1 0 1 0 0", // axis 4 out, area 16π > 15
            ],
        );
        let result = run(&text, &config);
        assert_eq!(result.r_ea, None); // eccentricity indicator is constant
        assert_eq!(result.r_eb, None);
        let r_ab = result.r_ab.unwrap();
        assert!((r_ab - 1.0).abs() < 1e-12);
    }

    #[test]
    fn underground_subtraction_uses_absolute_value() {
        // One crater inside a small window, three shape-accepted craters
        // outside it feed the background estimate.
        let config = RunConfig {
            cuts: CutThresholds {
                position_x: Range::new(-5.0, 5.0),
                position_y: Range::new(-5.0, 5.0),
                minor_axis: Range::new(0.0, 100.0),
                eccentricity: Range::new(0.0, 1.0),
                area: Range::new(0.0, 10_000.0),
            },
            dedup: DedupMode::None,
            underground_correction: true,
            ..RunConfig::default()
        };
        let text = scan_text(
            4,
            &[
                "0 0 0 0 1 1 0 1 0 0",
                "0 0 100 100 1 1 0 1 0 0",
                "0 0 -200 150 1 1 0 1 0 0",
                "0 0 300 -250 1 1 0 1 0 0",
            ],
        );
        let result = run(&text, &config);
        let est = result.underground.unwrap();
        assert_eq!(est.outside_count, 3);
        assert_eq!(result.accepted_count, 1);
        assert_eq!(
            result.filtered_count,
            1 - est.inside_background.abs()
        );
    }

    #[test]
    fn filter_levels_apply_declared_count_bias() {
        let text = scan_text(5, &["0 0 0 0 1 1 0 1 0 0", "0 0 10 0 1 1 0 1 0 0"]);
        let result = run(&text, &wide_open_config());
        // declared 5 - bias 3 = 2; both craters pass every cut.
        assert_eq!(result.filter_levels.position, 0);
        assert_eq!(result.filter_levels.axis, 0);
        assert_eq!(result.filter_levels.total, 0);
    }

    #[test]
    fn result_serializes_to_json() {
        let text = scan_text(1, &["0 0 0 0 1 1 0 1 0 0"]);
        let result = run(&text, &wide_open_config());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"unfiltered_count\":1"));
        assert!(json.contains("\"histograms\""));
    }
}
