//! Scan result file parsing: two-part header plus sequential feature records.
//!
//! The file is whitespace-delimited text. Two header lines declare the scan
//! geometry; every following line describes one detected feature in local
//! tile coordinates. The stream is read exactly once, forward-only, without
//! buffering the whole file. A trailing partial line is an expected
//! instrument artifact and simply ends the sequence.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Calibration;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while opening or parsing a scan file header.
///
/// A malformed or missing *record* is not an error at this level: the record
/// sequence ends there and everything read so far is the population.
#[derive(Debug)]
pub enum ScanError {
    /// The scan file could not be opened.
    MissingFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A header field was absent or unparsable.
    MalformedHeader {
        /// Which header field failed.
        field: &'static str,
    },
    /// A header scale factor was zero; the coordinate transform divides by it.
    ZeroScale {
        /// Axis of the offending scale factor.
        axis: char,
    },
    /// I/O failure while reading the header.
    Io(io::Error),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile { path, source } => {
                write!(f, "cannot open scan file {}: {}", path.display(), source)
            }
            Self::MalformedHeader { field } => {
                write!(f, "malformed scan header: bad or missing {}", field)
            }
            Self::ZeroScale { axis } => {
                write!(f, "scan header declares zero {}-scale factor", axis)
            }
            Self::Io(e) => write!(f, "i/o error while reading scan header: {}", e),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingFile { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Scan geometry declared by the file header.
///
/// Tile increments are *not* stored: the values written into the file are
/// not trusted and are recomputed from [`Calibration`] on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanHeader {
    /// Number of records the instrument claims to have written.
    pub record_count: i64,
    /// Physical units per coordinate unit along x; sign may be negative.
    pub scale_x: f64,
    /// Physical units per coordinate unit along y.
    pub scale_y: f64,
    /// Maximum tile index along x (0-based).
    pub tile_count_x: i64,
    /// Maximum tile index along y (0-based).
    pub tile_count_y: i64,
    /// Stage offset of tile (0, 0), x.
    pub origin_x: f64,
    /// Stage offset of tile (0, 0), y.
    pub origin_y: f64,
}

impl ScanHeader {
    /// Stage distance between adjacent tile origins along x.
    pub fn tile_increment_x(&self, cal: &Calibration) -> f64 {
        (cal.tile_size_px - cal.overlap_x_px) / self.scale_x.abs()
    }

    /// Stage distance between adjacent tile origins along y.
    pub fn tile_increment_y(&self, cal: &Calibration) -> f64 {
        (cal.tile_size_px - cal.overlap_y_px) / self.scale_y
    }
}

// ── Records ────────────────────────────────────────────────────────────────

/// One detected feature as emitted by the instrument, untransformed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    /// Tile index, x.
    pub tile_x: i64,
    /// Tile index, y.
    pub tile_y: i64,
    /// Intra-tile offset, x; signed, centered on the tile.
    pub local_u: f64,
    /// Intra-tile offset, y; signed, centered on the tile.
    pub local_v: f64,
    /// Fitted semi-minor axis, coordinate units.
    pub minor_axis: f64,
    /// Fitted eccentricity b/a in (0, 1]. Used as a divisor downstream.
    pub eccentricity: f64,
    /// Sine of the fitted rotation angle.
    pub rotation_sine: f64,
    /// Enclosed pixel area before physical-unit conversion.
    pub enclosed_area: f64,
    /// Trailing instrument fields, carried through but never computed on.
    pub aux: [f64; 2],
}

const RECORD_TOKENS: usize = 10;

// ── Tokenizer ──────────────────────────────────────────────────────────────

/// Forward-only whitespace tokenizer over a buffered reader.
#[derive(Debug)]
struct Tokens<R: BufRead> {
    inner: R,
}

impl<R: BufRead> Tokens<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next whitespace-delimited token, or `None` at end of input.
    fn next(&mut self) -> io::Result<Option<String>> {
        let mut tok: Vec<u8> = Vec::new();
        loop {
            let (used, at_boundary, at_eof) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    (0, false, true)
                } else {
                    let mut used = 0;
                    let mut at_boundary = false;
                    for &b in buf {
                        used += 1;
                        if b.is_ascii_whitespace() {
                            if tok.is_empty() {
                                continue;
                            }
                            at_boundary = true;
                            break;
                        }
                        tok.push(b);
                    }
                    (used, at_boundary, false)
                }
            };
            self.inner.consume(used);
            if at_boundary || at_eof {
                break;
            }
        }
        if tok.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&tok).into_owned()))
        }
    }

    fn expect(&mut self, field: &'static str) -> Result<String, ScanError> {
        match self.next() {
            Ok(Some(t)) => Ok(t),
            Ok(None) => Err(ScanError::MalformedHeader { field }),
            Err(e) => Err(ScanError::Io(e)),
        }
    }

    fn parse_i64(&mut self, field: &'static str) -> Result<i64, ScanError> {
        self.expect(field)?
            .parse()
            .map_err(|_| ScanError::MalformedHeader { field })
    }

    fn parse_f64(&mut self, field: &'static str) -> Result<f64, ScanError> {
        self.expect(field)?
            .parse()
            .map_err(|_| ScanError::MalformedHeader { field })
    }

    /// Consume and discard `n` tokens.
    fn skip(&mut self, n: usize, field: &'static str) -> Result<(), ScanError> {
        for _ in 0..n {
            self.expect(field)?;
        }
        Ok(())
    }
}

// ── Reader ─────────────────────────────────────────────────────────────────

/// Parsed scan file: header plus a single-pass record stream.
#[derive(Debug)]
pub struct ScanReader<R: BufRead> {
    tokens: Tokens<R>,
    header: ScanHeader,
}

impl ScanReader<BufReader<File>> {
    /// Open a scan file from disk and parse its header.
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let file = File::open(path).map_err(|source| ScanError::MissingFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> ScanReader<R> {
    /// Parse the two-part header from any buffered source.
    pub fn new(inner: R) -> Result<Self, ScanError> {
        let mut tokens = Tokens::new(inner);

        // First header line: count, scale factors, then brightness, contrast
        // and four instrument tags which the analysis never touches.
        let record_count = tokens.parse_i64("record count")?;
        let scale_x = tokens.parse_f64("x scale factor")?;
        let scale_y = tokens.parse_f64("y scale factor")?;
        tokens.skip(6, "first header block")?;

        // Second header line: tile counts, two mark pairs, the untrusted
        // increments, and the stage origin of tile (0, 0).
        let tile_count_x = tokens.parse_i64("x tile count")?;
        let tile_count_y = tokens.parse_i64("y tile count")?;
        tokens.skip(4, "mark positions")?;
        tokens.skip(2, "tile increments")?;
        let origin_x = tokens.parse_f64("x origin")?;
        let origin_y = tokens.parse_f64("y origin")?;

        if scale_x == 0.0 {
            return Err(ScanError::ZeroScale { axis: 'x' });
        }
        if scale_y == 0.0 {
            return Err(ScanError::ZeroScale { axis: 'y' });
        }

        Ok(Self {
            tokens,
            header: ScanHeader {
                record_count,
                scale_x,
                scale_y,
                tile_count_x,
                tile_count_y,
                origin_x,
                origin_y,
            },
        })
    }

    pub fn header(&self) -> &ScanHeader {
        &self.header
    }

    /// Consume the reader and iterate over records. Finite, forward-only,
    /// not restartable.
    pub fn records(self) -> Records<R> {
        Records {
            tokens: self.tokens,
            truncated: false,
            done: false,
        }
    }
}

/// Lazy record sequence. Stops at end-of-input or at the first malformed or
/// short line; everything yielded so far is the full population.
pub struct Records<R: BufRead> {
    tokens: Tokens<R>,
    truncated: bool,
    done: bool,
}

impl<R: BufRead> Records<R> {
    /// True when the stream ended on a partial or unparsable record rather
    /// than a clean end of input.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.done {
            return None;
        }

        let mut toks: Vec<String> = Vec::with_capacity(RECORD_TOKENS);
        for i in 0..RECORD_TOKENS {
            match self.tokens.next() {
                Ok(Some(t)) => toks.push(t),
                Ok(None) | Err(_) => {
                    self.done = true;
                    self.truncated = i > 0;
                    return None;
                }
            }
        }

        let parsed = (|| {
            Some(RawRecord {
                tile_x: toks[0].parse().ok()?,
                tile_y: toks[1].parse().ok()?,
                local_u: toks[2].parse().ok()?,
                local_v: toks[3].parse().ok()?,
                minor_axis: toks[4].parse().ok()?,
                eccentricity: toks[5].parse().ok()?,
                rotation_sine: toks[6].parse().ok()?,
                enclosed_area: toks[7].parse().ok()?,
                aux: [toks[8].parse().ok()?, toks[9].parse().ok()?],
            })
        })();

        match parsed {
            Some(rec) => Some(rec),
            None => {
                self.done = true;
                self.truncated = true;
                None
            }
        }
    }
}
