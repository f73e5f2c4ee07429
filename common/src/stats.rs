//! Statistics result type and the curated bin-width ladder used to
//! auto-choose a histogram resolution (spec §4.5).

use crate::time::Duration;

/// Curated "nice" bin widths, ascending, used when a `getStatistics`
/// caller does not name an explicit width. The chosen width is the
/// ladder entry nearest to `durationSeconds / 200`, clamped to the ladder
/// bounds, targeting roughly 100-200 bins.
pub const BIN_WIDTH_LADDER_SECS: &[u64] = &[
    1,
    5,
    10,
    20,
    30,
    60,           // 1m
    2 * 60,       // 2m
    5 * 60,       // 5m
    10 * 60,      // 10m
    15 * 60,      // 15m
    20 * 60,      // 20m
    30 * 60,      // 30m
    3600,         // 1h
    2 * 3600,     // 2h
    4 * 3600,     // 4h
    6 * 3600,     // 6h
    8 * 3600,     // 8h
    12 * 3600,    // 12h
    86_400,       // 1d
    2 * 86_400,   // 2d
    4 * 86_400,   // 4d
    7 * 86_400,   // 7d
    14 * 86_400,  // 14d
    30 * 86_400,  // 30d
    60 * 86_400,  // 60d
    90 * 86_400,  // 90d
    120 * 86_400, // 120d
    180 * 86_400, // 180d
    365 * 86_400, // 365d
];

pub fn bin_width_ladder() -> impl Iterator<Item = Duration> {
    BIN_WIDTH_LADDER_SECS
        .iter()
        .copied()
        .map(Duration::from_secs)
}

/// Aggregate statistics over a matched set of observations within one bin
/// (spec §4.5): count plus, where the result values were numeric, the
/// running min/max/sum needed to derive mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObsStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
}

impl ObsStats {
    pub fn empty() -> Self {
        ObsStats {
            count: 0,
            min: None,
            max: None,
            sum: 0.0,
        }
    }

    pub fn observe(&mut self, value: Option<f64>) {
        self.count += 1;
        if let Some(v) = value {
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
            self.sum += v;
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 || self.min.is_none() {
            return None;
        }
        Some(self.sum / self.count as f64)
    }
}

/// One bin of a histogram result: its `[begin, end)` bounds in seconds
/// since the query's epoch-relative start, and the stats observed in it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub begin_offset_secs: u64,
    pub end_offset_secs: u64,
    pub stats: ObsStats,
}
