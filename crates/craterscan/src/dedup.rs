//! Suppression of repeated detections from overlapping tiles.
//!
//! Adjacent tiles overlap physically, so a feature near a tile boundary can
//! be detected once per tile. Two records count as the same feature when
//! their absolute positions agree within ±0.5 stage units on both axes
//! simultaneously; the earliest record wins and later ones are suppressed.
//!
//! The position history is held in a unit-cell bucket index instead of a
//! flat list, which turns the all-pairs proximity scan into a 3×3
//! neighborhood lookup. The match predicate is unchanged.

use std::collections::HashMap;

use crate::config::{Calibration, DedupMode};

/// Half-width of the proximity window, absolute stage units.
const MATCH_HALF_WIDTH: f64 = 0.5;

/// Per-run duplicate filter. Rebuilt fresh for every run; the position
/// history grows linearly with record count and is never retained.
pub struct Deduplicator {
    mode: DedupMode,
    /// Every position seen so far, in file order.
    positions: Vec<[f64; 2]>,
    /// Unit cell -> indices into `positions`.
    cells: HashMap<(i64, i64), Vec<u32>>,
    /// Local |u| at or beyond this is inside the x tile-overlap band.
    edge_margin_u: f64,
    /// Local |v| at or beyond this is inside the y tile-overlap band.
    edge_margin_v: f64,
    suppressed: u64,
}

impl Deduplicator {
    pub fn new(mode: DedupMode, cal: &Calibration) -> Self {
        Self {
            mode,
            positions: Vec::new(),
            cells: HashMap::new(),
            edge_margin_u: cal.half_tile_px() - cal.overlap_x_px,
            edge_margin_v: cal.half_tile_px() - cal.overlap_y_px,
            suppressed: 0,
        }
    }

    /// Feed one record in file order. Returns `false` when it duplicates an
    /// earlier record and must be excluded from all downstream statistics.
    ///
    /// The position is appended to the history regardless of the outcome.
    pub fn admit(&mut self, pos: [f64; 2], local_u: f64, local_v: f64) -> bool {
        let duplicate = match self.mode {
            DedupMode::None => return true,
            DedupMode::EdgeOnly => {
                let near_edge =
                    local_u.abs() >= self.edge_margin_u || local_v.abs() >= self.edge_margin_v;
                near_edge && self.matches_earlier(pos)
            }
            DedupMode::Total => self.matches_earlier(pos),
        };
        self.insert(pos);
        if duplicate {
            self.suppressed += 1;
        }
        !duplicate
    }

    /// Number of records suppressed so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    fn matches_earlier(&self, pos: [f64; 2]) -> bool {
        let (cx, cy) = cell_of(pos);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(ids) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &i in ids {
                    let p = self.positions[i as usize];
                    if (pos[0] - p[0]).abs() <= MATCH_HALF_WIDTH
                        && (pos[1] - p[1]).abs() <= MATCH_HALF_WIDTH
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn insert(&mut self, pos: [f64; 2]) {
        let idx = self.positions.len() as u32;
        self.positions.push(pos);
        self.cells.entry(cell_of(pos)).or_default().push(idx);
    }
}

/// Unit-cell key. Cell size 1.0 covers the ±0.5 window, so any match lies in
/// the 3×3 neighborhood of the query cell.
fn cell_of(pos: [f64; 2]) -> (i64, i64) {
    (pos[0].floor() as i64, pos[1].floor() as i64)
}
