//! Query vocabulary for `ObsStore::select*`/`getStatistics` (spec §4.4).

use std::sync::Arc;

use crate::ids::{FoiId, ObservationId, StreamId};
use crate::record::ResultValue;
use crate::time::{Duration, Instant};

/// Bounds a query to a slice of either phenomenon or result time (spec
/// §4.4). Each named variant is shorthand for a `[begin, end)` range over
/// the sort key, kept distinct from a raw `range` so the planner can
/// special-case "just the latest sample" without a backward scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemporalFilter {
    AllTimes,
    CurrentTime,
    LatestTime,
    Range { begin: Instant, end: Instant },
    At(Instant),
}

impl TemporalFilter {
    /// Resolves to the `[begin, end)` bound a range scan uses. `LatestTime`
    /// and `CurrentTime` still resolve to the full range here; it's the
    /// planner that knows to turn those into "take the last record at or
    /// before the bound" rather than a forward scan (spec §4.4).
    pub fn bounds(&self) -> (Instant, Instant) {
        match *self {
            TemporalFilter::AllTimes => (Instant::MIN, Instant::MAX),
            TemporalFilter::CurrentTime | TemporalFilter::LatestTime => {
                (Instant::MIN, Instant::MAX)
            }
            TemporalFilter::Range { begin, end } => (begin, end),
            TemporalFilter::At(instant) => (instant, instant),
        }
    }

    pub fn wants_latest_only(&self) -> bool {
        matches!(
            self,
            TemporalFilter::CurrentTime | TemporalFilter::LatestTime
        )
    }
}

/// A post-filter over a decoded result value, applied after per-series
/// scanning (spec §4.4: "applied after per-series decoding"). Boxed
/// rather than an enum of comparison ops since the spec leaves its shape
/// abstract ("valuePredicate") and callers are expected to supply
/// arbitrary predicates.
pub type ValuePredicate = Arc<dyn Fn(&ResultValue) -> bool + Send + Sync>;

/// Selects which series an operation runs over, over what time range, and
/// what post-filtering to apply (spec §4.4's abstract filter shape).
/// `streams`/`fois` empty means "no restriction on that axis" — not
/// "match nothing". `internal_ids`, when non-empty, short-circuits the
/// planner entirely: each id is decoded and direct-fetched, with
/// `value_predicate` applied post-hoc (spec §4.4 "If `internalIds` is
/// present, it short-circuits planning").
#[derive(Clone, Default)]
pub struct ObservationFilter {
    pub internal_ids: Vec<ObservationId>,
    pub streams: Vec<StreamId>,
    pub fois: Vec<FoiId>,
    pub phenomenon_time: Option<TemporalFilter>,
    pub result_time: Option<TemporalFilter>,
    pub value_predicate: Option<ValuePredicate>,
    pub limit: Option<usize>,
}

impl std::fmt::Debug for ObservationFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationFilter")
            .field("internal_ids", &self.internal_ids)
            .field("streams", &self.streams)
            .field("fois", &self.fois)
            .field("phenomenon_time", &self.phenomenon_time)
            .field("result_time", &self.result_time)
            .field("value_predicate", &self.value_predicate.is_some())
            .field("limit", &self.limit)
            .finish()
    }
}

impl PartialEq for ObservationFilter {
    /// `value_predicate` is a closure, not comparable; two filters are
    /// equal when everything else matches and both either have one or
    /// don't.
    fn eq(&self, other: &Self) -> bool {
        self.internal_ids == other.internal_ids
            && self.streams == other.streams
            && self.fois == other.fois
            && self.phenomenon_time == other.phenomenon_time
            && self.result_time == other.result_time
            && self.value_predicate.is_some() == other.value_predicate.is_some()
            && self.limit == other.limit
    }
}

impl ObservationFilter {
    pub fn new() -> Self {
        ObservationFilter::default()
    }

    pub fn with_internal_id(mut self, id: ObservationId) -> Self {
        self.internal_ids.push(id);
        self
    }

    pub fn with_stream(mut self, stream_id: StreamId) -> Self {
        self.streams.push(stream_id);
        self
    }

    pub fn with_foi(mut self, foi_id: FoiId) -> Self {
        self.fois.push(foi_id);
        self
    }

    pub fn with_phenomenon_time(mut self, temporal: TemporalFilter) -> Self {
        self.phenomenon_time = Some(temporal);
        self
    }

    pub fn with_result_time(mut self, temporal: TemporalFilter) -> Self {
        self.result_time = Some(temporal);
        self
    }

    pub fn with_value_predicate(mut self, predicate: ValuePredicate) -> Self {
        self.value_predicate = Some(predicate);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn phenomenon_time_or_all(&self) -> TemporalFilter {
        self.phenomenon_time.unwrap_or(TemporalFilter::AllTimes)
    }

    pub fn result_time_or_all(&self) -> TemporalFilter {
        self.result_time.unwrap_or(TemporalFilter::AllTimes)
    }

    pub fn has_post_filter(&self) -> bool {
        self.value_predicate.is_some()
    }
}

/// Request shape for `getStatistics` (spec §4.5): either a caller-chosen
/// bin width, or "pick one off the ladder for me".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinWidth {
    Auto,
    Explicit(Duration),
}

/// Full request for the histogram/statistics engine (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRequest {
    pub filter: ObservationFilter,
    pub bin_width: BinWidth,
    /// Fold all matched series into one histogram rather than one per
    /// series (spec §4.5, §9 — bin-width mixing across series is
    /// disallowed, see DESIGN.md Open Question 2).
    pub aggregate_fois: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_times_spans_the_full_sentinel_range() {
        let (begin, end) = TemporalFilter::AllTimes.bounds();
        assert_eq!(begin, Instant::MIN);
        assert_eq!(end, Instant::MAX);
    }

    #[test]
    fn empty_stream_and_foi_lists_mean_unrestricted() {
        let filter = ObservationFilter::new();
        assert!(filter.streams.is_empty());
        assert!(filter.fois.is_empty());
    }

    #[test]
    fn internal_ids_present_marks_a_short_circuit_query() {
        let filter =
            ObservationFilter::new().with_internal_id(ObservationId(bytes::Bytes::from_static(b"x")));
        assert_eq!(filter.internal_ids.len(), 1);
    }
}
