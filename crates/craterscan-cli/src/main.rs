//! craterscan CLI — batch crater population analysis for scan result files.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use craterscan::histogram::Hist1d;
use craterscan::{CutThresholds, DedupMode, Range, RunConfig, RunResult};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "craterscan")]
#[command(about = "Analyze crater populations in tiled microscope scan result files")]
#[command(version)]
struct Cli {
    /// Path to the scan result file.
    #[arg(long)]
    scan: PathBuf,

    /// Path to write run results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Directory for per-histogram text dumps (bin index, center, content).
    #[arg(long)]
    dump_hist: Option<PathBuf>,

    /// Position cut minimum, x [µm].
    #[arg(long, default_value_t = 0.0)]
    x_min: f64,
    /// Position cut maximum, x [µm].
    #[arg(long, default_value_t = 140_000.0)]
    x_max: f64,
    /// Position cut minimum, y [µm].
    #[arg(long, default_value_t = 0.0)]
    y_min: f64,
    /// Position cut maximum, y [µm].
    #[arg(long, default_value_t = 140_000.0)]
    y_max: f64,
    /// Semi-minor axis cut minimum [µm].
    #[arg(long, default_value_t = 0.0)]
    b_min: f64,
    /// Semi-minor axis cut maximum [µm].
    #[arg(long, default_value_t = 4.0)]
    b_max: f64,
    /// Eccentricity cut minimum.
    #[arg(long, default_value_t = 0.0)]
    e_min: f64,
    /// Eccentricity cut maximum.
    #[arg(long, default_value_t = 1.0)]
    e_max: f64,
    /// Calculated-area cut minimum [µm²].
    #[arg(long, default_value_t = 0.0)]
    area_min: f64,
    /// Calculated-area cut maximum [µm²].
    #[arg(long, default_value_t = 40.0)]
    area_max: f64,

    /// Duplicate suppression for tile-overlap re-detections.
    #[arg(long, value_enum, default_value_t = DedupArg::None)]
    dedup: DedupArg,

    /// Disable the uniform-background (underground) subtraction.
    #[arg(long)]
    no_underground: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DedupArg {
    /// Accept every record.
    None,
    /// Check positions only inside the tile-overlap band.
    Edge,
    /// Check positions over the whole scanned area.
    Total,
}

// default_value_t renders through Display.
impl std::fmt::Display for DedupArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DedupArg::None => "none",
            DedupArg::Edge => "edge",
            DedupArg::Total => "total",
        };
        f.write_str(name)
    }
}

impl From<DedupArg> for DedupMode {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::None => DedupMode::None,
            DedupArg::Edge => DedupMode::EdgeOnly,
            DedupArg::Total => DedupMode::Total,
        }
    }
}

impl Cli {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            cuts: CutThresholds {
                position_x: Range::new(self.x_min, self.x_max),
                position_y: Range::new(self.y_min, self.y_max),
                minor_axis: Range::new(self.b_min, self.b_max),
                eccentricity: Range::new(self.e_min, self.e_max),
                area: Range::new(self.area_min, self.area_max),
            },
            dedup: self.dedup.into(),
            underground_correction: !self.no_underground,
            ..RunConfig::default()
        }
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> CliResult<()> {
    let config = cli.to_config();

    tracing::info!("Analyzing scan: {}", cli.scan.display());
    let result = craterscan::analyze_file(&cli.scan, &config)?;

    tracing::info!(
        "{} unfiltered craters, {} filtered ({} duplicates suppressed, {} degenerate skipped)",
        result.unfiltered_count,
        result.filtered_count,
        result.duplicates_suppressed,
        result.degenerate_skipped,
    );
    tracing::info!(
        "Scanned area: {:.3} mm², correlations r_EA={} r_EB={} r_AB={}",
        result.scanned_area / 1.0e6,
        fmt_corr(result.r_ea),
        fmt_corr(result.r_eb),
        fmt_corr(result.r_ab),
    );
    if result.truncated_tail {
        tracing::warn!("scan file ended on a partial record; population truncated there");
    }

    let json = serde_json::to_string_pretty(&result)?;
    fs::write(&cli.out, &json)?;
    tracing::info!("Results written to {}", cli.out.display());

    if let Some(dir) = &cli.dump_hist {
        dump_histograms(dir, cli, &config, &result)?;
        tracing::info!("Histogram dumps written to {}", dir.display());
    }

    Ok(())
}

fn fmt_corr(r: Option<f64>) -> String {
    match r {
        Some(v) => format!("{v:.3}"),
        None => "undefined".to_string(),
    }
}

// ── histogram dumps ────────────────────────────────────────────────────────

fn dump_histograms(
    dir: &Path,
    cli: &Cli,
    config: &RunConfig,
    result: &RunResult,
) -> CliResult<()> {
    fs::create_dir_all(dir)?;
    let h = &result.histograms;
    let dumps: [(&str, &str, &Hist1d); 7] = [
        ("h_b_axis", "Semi Minor Axis without Cuts", &h.minor_axis),
        ("h_b_axis_cut", "Semi Minor Axis with Cuts", &h.minor_axis_cut),
        ("hecc", "Eccentricity without Cuts", &h.eccentricity),
        ("hecc_cut", "Eccentricity with Cuts", &h.eccentricity_cut),
        ("harea_ea", "Enclosed Area without Cuts", &h.enclosed_area),
        ("harea_ca", "Calculated Area without Cuts", &h.calculated_area),
        (
            "harea_ca_cut",
            "Calculated Area with Cuts",
            &h.calculated_area_cut,
        ),
    ];
    for (name, title, hist) in dumps {
        let path = dir.join(format!("{name}.txt"));
        fs::write(&path, render_dump(name, title, hist, cli, config, result))?;
    }
    Ok(())
}

/// Legacy export layout: header block, then one line per bucket, first line
/// underflow, last line overflow.
fn render_dump(
    name: &str,
    title: &str,
    hist: &Hist1d,
    cli: &Cli,
    config: &RunConfig,
    result: &RunResult,
) -> String {
    let cuts = &config.cuts;
    let mut out = String::new();
    let _ = writeln!(out, "Histogram of {title}:  {name}");
    let _ = writeln!(out, "analyzed data file:  {}", cli.scan.display());
    let _ = writeln!(out, "Dedup mode:  {:?}", config.dedup);
    let _ = writeln!(
        out,
        "scanned area [Fields x,y]:  {}\t{}\tA_Scan [µm²] = \t{}",
        result.header.tile_count_x + 1,
        result.header.tile_count_y + 1,
        result.scanned_area,
    );
    let _ = writeln!(
        out,
        "Cuts [x_min, x_max, y_min, y_max, b_min, b_max, e_min, e_max, area_min, area_max]:"
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}  {}  {}  {}  {}  {}",
        cuts.position_x.min,
        cuts.position_x.max,
        cuts.position_y.min,
        cuts.position_y.max,
        cuts.minor_axis.min,
        cuts.minor_axis.max,
        cuts.eccentricity.min,
        cuts.eccentricity.max,
        cuts.area.min,
        cuts.area.max,
    );
    let _ = writeln!(
        out,
        "Correlation Coefficients [r_EA, r_EB, r_AB]:  {}\t{}\t{}",
        fmt_corr(result.r_ea),
        fmt_corr(result.r_eb),
        fmt_corr(result.r_ab),
    );
    let _ = writeln!(
        out,
        "Number of unfiltered Craters = {}\tNumber of filtered Craters = {}",
        result.unfiltered_count, result.filtered_count,
    );
    let _ = writeln!(
        out,
        "Scaling-Factors [x,y]: {}\t{}",
        result.header.scale_x, result.header.scale_y,
    );
    let _ = writeln!(out, "Results [Bin Number, Bin Center, Bin Content]:");
    let _ = writeln!(out, "first line: Underflows, last line: Overflows");
    for (i, (center, count)) in hist.bins().enumerate() {
        let _ = writeln!(out, "{i}\t{center}\t{count}");
    }
    out
}
