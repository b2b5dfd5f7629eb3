//! End-to-end pipeline tests over synthetic scan text.

use std::io::Cursor;

use craterscan::{
    analyze, CutThresholds, DedupMode, Range, RunConfig, RunResult, ScanReader,
};

/// Scan header: unit scales, 2×1 tile grid (max indices 1 and 0), origin at
/// (0, 0). Tile increment is (1024 − 60) / 1 = 964 µm on both axes.
const HEADER: &str = "6 1 1 128 128 t t t t\n1 0 0 0 0 0 964 964 0 0\n";

fn run(records: &[&str], config: &RunConfig) -> RunResult {
    let mut text = String::from(HEADER);
    for r in records {
        text.push_str(r);
        text.push('\n');
    }
    let reader = ScanReader::new(Cursor::new(text.into_bytes())).unwrap();
    analyze(reader, config)
}

fn config(dedup: DedupMode) -> RunConfig {
    RunConfig {
        cuts: CutThresholds {
            position_x: Range::new(0.0, 2_000.0),
            position_y: Range::new(-600.0, 600.0),
            minor_axis: Range::new(0.0, 4.0),
            eccentricity: Range::new(0.0, 1.0),
            area: Range::new(0.0, 40.0),
        },
        dedup,
        underground_correction: false,
        ..RunConfig::default()
    }
}

#[test]
fn overlap_redetection_is_suppressed_in_edge_mode() {
    // The same physical crater seen from tile 0 (near its right edge,
    // u = 482) and from tile 1 (near its left edge, u = 482 - 964 = -482):
    // both map to absolute x = 482.
    let records = [
        "0 0 482 0 1.2 1 0 4 0 0",
        "1 0 -482 0 1.2 1 0 4 0 0",
        // Interior crater, never proximity-checked in edge mode.
        "1 0 0 0 1.2 1 0 4 0 0",
    ];
    let result = run(&records, &config(DedupMode::EdgeOnly));
    assert_eq!(result.duplicates_suppressed, 1);
    assert_eq!(result.unfiltered_count, 2);
    assert_eq!(result.accepted_count, 2);
}

#[test]
fn no_dedup_keeps_the_redetection() {
    let records = ["0 0 482 0 1.2 1 0 4 0 0", "1 0 -482 0 1.2 1 0 4 0 0"];
    let result = run(&records, &config(DedupMode::None));
    assert_eq!(result.duplicates_suppressed, 0);
    assert_eq!(result.unfiltered_count, 2);
}

#[test]
fn population_statistics_cover_the_full_run() {
    let records = [
        "0 0 0 0 1.0 1 0 4 0 0",    // accepted
        "0 0 50 50 0.9 0.9 0.1 4 0 0", // accepted
        "1 0 0 0 5.0 1 0 4 0 0",    // axis 5 > 4, area 25π > 40: rejected
        "0 0 -100 0 1.0 1 0 4 0 0", // x = -100 outside window: rejected
    ];
    let result = run(&records, &config(DedupMode::Total));
    assert_eq!(result.unfiltered_count, 4);
    assert_eq!(result.accepted_count, 2);
    assert_eq!(result.criterion_counts.position, 3);
    assert_eq!(result.criterion_counts.axis, 3);
    assert_eq!(result.criterion_counts.area, 3);
    assert_eq!(result.criterion_counts.eccentricity, 4);
    // Axis and area reject exactly the same single record.
    assert!((result.r_ab.unwrap() - 1.0).abs() < 1e-12);
    // Eccentricity never rejects: its two coefficients are indeterminate.
    assert_eq!(result.r_ea, None);
    assert_eq!(result.r_eb, None);
    // declared 6 - bias 3 = 3.
    assert_eq!(result.filter_levels.position, 0);
    assert_eq!(result.filter_levels.axis, 0);
    assert_eq!(result.filter_levels.eccentricity, -1);
    // total: declared 3 minus the 2 craters surviving every cut.
    assert_eq!(result.filter_levels.total, 1);
    // 2 tiles along x: (1·964 + 964) · (0·964 + 964).
    assert!((result.scanned_area - 1928.0 * 964.0).abs() < 1e-6);
}

#[test]
fn underground_correction_subtracts_background() {
    let mut cfg = config(DedupMode::None);
    cfg.underground_correction = true;
    // Shrink the window so the three far craters sit outside it while still
    // passing the shape cuts.
    cfg.cuts.position_x = Range::new(-10.0, 10.0);
    cfg.cuts.position_y = Range::new(-10.0, 10.0);
    let records = [
        "0 0 0 0 1.0 1 0 4 0 0",
        "0 0 200 200 1.0 1 0 4 0 0",
        "0 0 -300 100 1.0 1 0 4 0 0",
        "1 0 0 -200 1.0 1 0 4 0 0",
    ];
    let result = run(&records, &cfg);
    let est = result.underground.expect("correction enabled");
    assert_eq!(est.outside_count, 3);
    assert!(est.outside_area > 0.0);
    assert_eq!(
        result.filtered_count,
        result.accepted_count as i64 - est.inside_background.abs()
    );
}

#[test]
fn run_results_are_independent_between_invocations() {
    let records = ["0 0 0 0 1.0 1 0 4 0 0"];
    let cfg = config(DedupMode::Total);
    let first = run(&records, &cfg);
    let second = run(&records, &cfg);
    assert_eq!(first.unfiltered_count, second.unfiltered_count);
    assert_eq!(first.filtered_count, second.filtered_count);
    assert_eq!(
        first.histograms.minor_axis.counts(),
        second.histograms.minor_axis.counts()
    );
}

#[test]
fn missing_file_aborts_cleanly() {
    let err = craterscan::analyze_file("/no/such/scan.asf", &RunConfig::default()).unwrap_err();
    assert!(matches!(err, craterscan::ScanError::MissingFile { .. }));
    assert!(err.to_string().contains("/no/such/scan.asf"));
}
