//! Fixed-range histograms with underflow/overflow buckets.
//!
//! Bin numbering follows the instrument's legacy export convention: bucket 0
//! is underflow, buckets `1..=n` cover `[lo, hi)` uniformly, bucket `n + 1`
//! is overflow. Centers extrapolate the uniform grid into the boundary
//! buckets so a dump can print one `(index, center, count)` line per bucket.

use serde::{Deserialize, Serialize};

use crate::config::BinSpec;

/// One uniform axis shared by the 1D and 2D histograms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Axis {
    lo: f64,
    hi: f64,
    n: usize,
}

impl Axis {
    fn new(spec: &BinSpec) -> Self {
        assert!(spec.bins > 0, "histogram requires at least one bin");
        assert!(spec.hi > spec.lo, "histogram range must be non-empty");
        Self {
            lo: spec.lo,
            hi: spec.hi,
            n: spec.bins,
        }
    }

    fn width(&self) -> f64 {
        (self.hi - self.lo) / self.n as f64
    }

    /// Bucket index in `0..n + 2`. Non-finite values land in overflow so a
    /// stray NaN can never vanish silently.
    fn bucket(&self, v: f64) -> usize {
        if v.is_nan() {
            self.n + 1
        } else if v < self.lo {
            0
        } else if v >= self.hi {
            self.n + 1
        } else {
            1 + ((v - self.lo) / self.width()) as usize
        }
    }

    /// Center of bucket `i`; boundary buckets extrapolate the grid.
    fn center(&self, i: usize) -> f64 {
        self.lo + (i as f64 - 0.5) * self.width()
    }
}

/// 1D histogram over a fixed range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1d {
    axis: Axis,
    /// Length `n + 2`: underflow, in-range buckets, overflow.
    counts: Vec<u64>,
}

impl Hist1d {
    pub fn new(spec: &BinSpec) -> Self {
        let axis = Axis::new(spec);
        Self {
            counts: vec![0; axis.n + 2],
            axis,
        }
    }

    pub fn fill(&mut self, v: f64) {
        self.counts[self.axis.bucket(v)] += 1;
    }

    /// In-range bin count (excluding the two boundary buckets).
    pub fn n_bins(&self) -> usize {
        self.axis.n
    }

    pub fn bin_width(&self) -> f64 {
        self.axis.width()
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        self.axis.center(i)
    }

    /// All buckets including underflow and overflow.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total entries across all buckets.
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(center, count)` pairs, first underflow, last overflow.
    pub fn bins(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &c)| (self.axis.center(i), c))
    }
}

/// 2D histogram over a fixed x/y range, row-major over y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2d {
    x_axis: Axis,
    y_axis: Axis,
    /// Length `(nx + 2) * (ny + 2)`, index `iy * (nx + 2) + ix`.
    counts: Vec<u64>,
}

impl Hist2d {
    pub fn new(x: &BinSpec, y: &BinSpec) -> Self {
        let x_axis = Axis::new(x);
        let y_axis = Axis::new(y);
        Self {
            counts: vec![0; (x_axis.n + 2) * (y_axis.n + 2)],
            x_axis,
            y_axis,
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        let ix = self.x_axis.bucket(x);
        let iy = self.y_axis.bucket(y);
        self.counts[iy * (self.x_axis.n + 2) + ix] += 1;
    }

    pub fn n_bins_x(&self) -> usize {
        self.x_axis.n
    }

    pub fn n_bins_y(&self) -> usize {
        self.y_axis.n
    }

    pub fn x_center(&self, ix: usize) -> f64 {
        self.x_axis.center(ix)
    }

    pub fn y_center(&self, iy: usize) -> f64 {
        self.y_axis.center(iy)
    }

    pub fn count_at(&self, ix: usize, iy: usize) -> u64 {
        self.counts[iy * (self.x_axis.n + 2) + ix]
    }

    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }
}
