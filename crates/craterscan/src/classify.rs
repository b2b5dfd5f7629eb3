//! Four-way acceptance classification with running per-criterion counts.
//!
//! The four range tests are independent and commutative: evaluation order
//! never changes the outcome, only which running counter increments. A
//! feature is accepted when all four pass.

use serde::{Deserialize, Serialize};

use crate::config::CutThresholds;

/// Outcome of the four independent range tests for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutFlags {
    /// x and y both inside the spatial acceptance window.
    pub position_ok: bool,
    pub axis_ok: bool,
    pub eccentricity_ok: bool,
    pub area_ok: bool,
}

impl CutFlags {
    /// Conjunction of all four criteria.
    pub fn accepted(&self) -> bool {
        self.position_ok && self.axis_ok && self.eccentricity_ok && self.area_ok
    }
}

/// Number of unfiltered features passing each criterion in isolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionCounts {
    pub position: u64,
    pub axis: u64,
    pub eccentricity: u64,
    pub area: u64,
}

/// Streaming classifier over the deduplicated population.
pub struct Classifier {
    cuts: CutThresholds,
    counts: CriterionCounts,
    accepted: u64,
}

impl Classifier {
    pub fn new(cuts: CutThresholds) -> Self {
        Self {
            cuts,
            counts: CriterionCounts::default(),
            accepted: 0,
        }
    }

    /// Evaluate one feature; the running counters update as a side effect.
    pub fn classify(
        &mut self,
        x: f64,
        y: f64,
        minor_axis: f64,
        eccentricity: f64,
        area: f64,
    ) -> CutFlags {
        let flags = CutFlags {
            position_ok: self.cuts.position_x.contains(x) && self.cuts.position_y.contains(y),
            axis_ok: self.cuts.minor_axis.contains(minor_axis),
            eccentricity_ok: self.cuts.eccentricity.contains(eccentricity),
            area_ok: self.cuts.area.contains(area),
        };
        if flags.position_ok {
            self.counts.position += 1;
        }
        if flags.axis_ok {
            self.counts.axis += 1;
        }
        if flags.eccentricity_ok {
            self.counts.eccentricity += 1;
        }
        if flags.area_ok {
            self.counts.area += 1;
        }
        if flags.accepted() {
            self.accepted += 1;
        }
        flags
    }

    pub fn counts(&self) -> CriterionCounts {
        self.counts
    }

    /// Features that passed all four criteria.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}
