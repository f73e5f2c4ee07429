//! Query planner & executor (spec §4.4): turns an `ObservationFilter`
//! into the smallest driving set of per-series range scans, merges the
//! result in phenomenon-time order via `merge::merge_by_phenomenon_time`,
//! and applies post-filters/limit. Grounded on the teacher's lazy
//! `async_stream::try_stream!`-over-cursor pull model
//! (`lite/src/backend/read.rs`), generalized from one log to many
//! independent per-series logs fanned into a k-way merge.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use obsdb_common::{
    FoiId, Instant, ObservationFilter, ObservationId, ObservationRecord, RecordEncoding, StreamId,
    TemporalFilter,
};

use crate::error::{CorruptionError, GetStreamError, SelectError, StorageError, TooBroadError};
use crate::indexes::{Indexes, SeriesHandle};
use crate::keys::{public_id, record_key};
use crate::merge::{MergeItem, merge_by_phenomenon_time};
use crate::metrics;
use crate::registry::Registries;

/// Default cap on the number of series one query may select (spec §4.4).
pub const DEFAULT_SERIES_CAP: usize = 10_000;
/// A resolved driving set more than this multiple of the cap fails the
/// query outright instead of silently truncating (spec §4.4 "TooBroad").
pub const TOO_BROAD_MULTIPLIER: usize = 100;

fn now() -> Instant {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Instant::at(elapsed.as_secs() as i64, elapsed.subsec_nanos())
}

pub struct Planner<'a> {
    indexes: &'a Indexes,
    registries: &'a Registries,
    series_cap: usize,
}

impl<'a> Planner<'a> {
    pub fn new(indexes: &'a Indexes, registries: &'a Registries) -> Self {
        Self {
            indexes,
            registries,
            series_cap: DEFAULT_SERIES_CAP,
        }
    }

    pub fn with_series_cap(mut self, cap: usize) -> Self {
        self.series_cap = cap;
        self
    }

    /// The planning-rules table (spec §4.4): pick the smallest driving
    /// set for `(streamFilter, foiFilter)`, enforcing the `TooBroad` cap.
    /// Does not apply `internal_ids` — those short-circuit before this is
    /// ever called (see [`Planner::select`]).
    async fn resolve_series(&self, filter: &ObservationFilter) -> Result<Vec<SeriesHandle>, SelectError> {
        let mut handles = Vec::new();
        match (filter.streams.is_empty(), filter.fois.is_empty()) {
            (true, true) => {
                let mut stream = self.indexes.all_series();
                while let Some(handle) = stream.next().await {
                    handles.push(handle?);
                }
            }
            (false, true) => {
                for &stream_id in &filter.streams {
                    let mut stream = self.indexes.series_for_stream(stream_id);
                    while let Some(handle) = stream.next().await {
                        handles.push(handle?);
                    }
                }
            }
            (true, false) => {
                for &foi_id in &filter.fois {
                    let mut stream = self.indexes.series_for_foi(foi_id);
                    while let Some(handle) = stream.next().await {
                        handles.push(handle?);
                    }
                }
            }
            (false, false) => {
                let allowed: HashSet<StreamId> = filter.streams.iter().copied().collect();
                for &foi_id in &filter.fois {
                    let mut stream = self.indexes.series_for_foi(foi_id);
                    while let Some(handle) = stream.next().await {
                        let handle = handle?;
                        if allowed.contains(&handle.stream_id) {
                            handles.push(handle);
                        }
                    }
                }
            }
        }

        if handles.len() > self.series_cap * TOO_BROAD_MULTIPLIER {
            return Err(TooBroadError {
                resolved: handles.len(),
                cap: self.series_cap,
            }
            .into());
        }
        handles.truncate(self.series_cap);
        Ok(handles)
    }

    /// Narrows `handles` by the `resultTime` half of the filter (spec
    /// §4.4). A series with `storedResultTime == -infinity` always passes
    /// unchanged here — its true per-record `resultTime` equals
    /// `phenomenonTime`, so the result-time filter is applied per-record
    /// instead, during the per-series scan in [`scan_one_series`].
    ///
    /// `latestTime`/`currentTime` collapse every group of explicit-
    /// result-time handles sharing `(streamId, foiId)` down to the one
    /// with the greatest `resultTime` — the spec leaves the exact
    /// selection rule across multiple model runs of the same stream/foi
    /// implicit; this is the reading recorded in DESIGN.md.
    fn filter_by_result_time(&self, handles: Vec<SeriesHandle>, result_time: TemporalFilter) -> Vec<SeriesHandle> {
        let (normalized, mut explicit): (Vec<_>, Vec<_>) =
            handles.into_iter().partition(|h| h.result_time == Instant::NegInfinity);

        match result_time {
            TemporalFilter::AllTimes => {}
            TemporalFilter::Range { begin, end } => {
                explicit.retain(|h| h.result_time >= begin && h.result_time < end);
            }
            TemporalFilter::At(t) => {
                explicit.retain(|h| h.result_time == t);
            }
            TemporalFilter::CurrentTime | TemporalFilter::LatestTime => {
                let bound = if matches!(result_time, TemporalFilter::CurrentTime) {
                    now()
                } else {
                    Instant::MAX
                };
                let mut best: HashMap<(StreamId, FoiId), SeriesHandle> = HashMap::new();
                for handle in explicit {
                    if handle.result_time > bound {
                        continue;
                    }
                    best.entry((handle.stream_id, handle.foi_id))
                        .and_modify(|current| {
                            if handle.result_time > current.result_time {
                                *current = handle;
                            }
                        })
                        .or_insert(handle);
                }
                explicit = best.into_values().collect();
            }
        }

        normalized.into_iter().chain(explicit).collect()
    }

    /// Looks up `stream_id`'s `RecordEncoding`, translating a registry
    /// miss into [`CorruptionError`] — a series handle only exists
    /// because `SeriesByStream` names this stream, so an absent registry
    /// entry means the two indexes have drifted apart (spec §7
    /// `Corruption`), not a routine not-found.
    async fn encoding_of(&self, stream_id: StreamId) -> Result<RecordEncoding, SelectError> {
        match self.registries.get_stream(stream_id).await {
            Ok(meta) => Ok(meta.encoding),
            Err(GetStreamError::Storage(e)) => Err(SelectError::Storage(e)),
            Err(GetStreamError::NotFound(_)) => Err(SelectError::Corruption(CorruptionError(format!(
                "series index names stream `{stream_id}` but its registry entry is gone"
            )))),
        }
    }

    /// Builds the decoded, merged, phenomenon-time-ordered stream of
    /// `(opaqueId, record)` pairs for `filter` (spec §4.4's full read
    /// path, before `selectEntries`/`selectKeys`/`selectResults` project
    /// out what they each need and `limit` is applied).
    pub async fn select(
        &self,
        filter: ObservationFilter,
    ) -> Result<BoxStream<'static, Result<(ObservationId, ObservationRecord), SelectError>>, SelectError> {
        let started = std::time::Instant::now();
        if !filter.internal_ids.is_empty() {
            let stream = self.select_by_internal_ids(filter);
            metrics::observe_select_latency(started.elapsed());
            return Ok(stream);
        }

        let handles = self.resolve_series(&filter).await?;
        let result_time = filter.result_time_or_all();
        let handles = self.filter_by_result_time(handles, result_time);
        metrics::observe_series_fanout(handles.len());
        let phenomenon_time = filter.phenomenon_time_or_all();

        let mut encodings = HashMap::new();
        for handle in &handles {
            if let std::collections::hash_map::Entry::Vacant(slot) = encodings.entry(handle.stream_id) {
                slot.insert(self.encoding_of(handle.stream_id).await?);
            }
        }

        let mut per_series_streams = Vec::with_capacity(handles.len());
        for handle in handles {
            let encoding = encodings[&handle.stream_id];
            per_series_streams.push(scan_one_series(self.indexes, handle, phenomenon_time, result_time, encoding));
        }

        let merged = merge_by_phenomenon_time(per_series_streams);
        let value_predicate = filter.value_predicate.clone();
        let limit = filter.limit;

        let stream = try_stream! {
            let mut merged = merged;
            let mut emitted = 0usize;
            while let Some(item) = merged.next().await {
                let item = item.map_err(SelectError::from)?;
                let (id, record) = item.payload;
                if let Some(predicate) = &value_predicate {
                    if !predicate(&record.result) {
                        continue;
                    }
                }
                yield (id, record);
                emitted += 1;
                if let Some(limit) = limit {
                    if emitted >= limit {
                        break;
                    }
                }
            }
        };
        // Only the planning phase (driving-set resolution, result-time
        // filtering, encoding lookups) is timed here — the returned stream
        // is lazy, so a full drain would measure the caller's own
        // consumption rate rather than this crate's work.
        metrics::observe_select_latency(started.elapsed());
        Ok(Box::pin(stream))
    }

    /// `internalIds` short-circuit (spec §4.4): decode and direct-fetch
    /// each id, skipping the planner entirely. `RecordEncoding` has only
    /// one variant today, so this path fetches with it directly rather
    /// than paying for a stream-meta lookup per id; the moment a second
    /// encoding exists this needs to resolve each id's owning stream
    /// first, the same way [`Planner::select`] does for its driving set.
    fn select_by_internal_ids(
        &self,
        filter: ObservationFilter,
    ) -> BoxStream<'static, Result<(ObservationId, ObservationRecord), SelectError>> {
        let indexes = self.indexes.clone();
        let ids = filter.internal_ids.clone();
        let value_predicate = filter.value_predicate.clone();
        let limit = filter.limit;
        let stream = try_stream! {
            let mut emitted = 0usize;
            for id in ids {
                if public_id::decode(&id).is_none() {
                    continue;
                }
                let Some(record) = indexes.get(&id, RecordEncoding::Json).await? else {
                    continue;
                };
                if let Some(predicate) = &value_predicate {
                    if !predicate(&record.result) {
                        continue;
                    }
                }
                yield (id, record);
                emitted += 1;
                if let Some(limit) = limit {
                    if emitted >= limit {
                        break;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    /// Same driving set and merge as [`Planner::select`], but counts
    /// instead of collecting — shares the scan path rather than the
    /// rank-arithmetic shortcut spec §4.4 allows for the no-post-filter
    /// case, which trivially satisfies "count equals scan" (spec §8
    /// invariant 5) by construction. See DESIGN.md for the rank-
    /// arithmetic fast path used instead by `stats::histogram`.
    pub async fn count_matching(&self, filter: ObservationFilter) -> Result<u64, SelectError> {
        let mut stream = self.select(filter).await?;
        let mut count = 0u64;
        while let Some(item) = stream.next().await {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Distinct `FoiId`s touched by `filter`'s matching records (spec §4.4
    /// `selectObservedFois`), in first-seen merge order.
    pub async fn select_observed_fois(&self, filter: ObservationFilter) -> Result<Vec<FoiId>, SelectError> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut stream = self.select(filter).await?;
        while let Some(item) = stream.next().await {
            let (_, record) = item?;
            if seen.insert(record.foi_id) {
                ordered.push(record.foi_id);
            }
        }
        Ok(ordered)
    }
}

/// Scans one series' records within the filter's combined time bounds,
/// decoding each into the caller-facing `(opaqueId, record)` shape (spec
/// §4.4 "Per-series obs streams").
fn scan_one_series(
    indexes: &Indexes,
    handle: SeriesHandle,
    phenomenon_time: TemporalFilter,
    result_time: TemporalFilter,
    encoding: RecordEncoding,
) -> BoxStream<'static, Result<MergeItem<(ObservationId, ObservationRecord)>, StorageError>> {
    let indexes = indexes.clone();
    let is_normalized = handle.result_time == Instant::NegInfinity;

    let bound = if is_normalized {
        intersect(phenomenon_time, result_time)
    } else {
        phenomenon_time
    };

    let latest_only = bound.wants_latest_only();
    let (lower, upper) = bound.bounds();

    let stream = try_stream! {
        if latest_only {
            let probe = match bound {
                TemporalFilter::CurrentTime => now(),
                _ => Instant::MAX,
            };
            let mut scan = indexes.scan_series(handle.series_id, Instant::MIN, probe);
            let mut last = None;
            while let Some(entry) = scan.next().await {
                last = Some(entry?);
            }
            if let Some((phenomenon_time, bytes)) = last {
                let (foi_id, result_time, encoded) = record_key::deser_value(bytes)?;
                let result = encoding
                    .decode(&encoded)
                    .map_err(|e| StorageError::from(crate::keys::DeserializationError::Json(e.to_string())))?;
                let record = ObservationRecord { foi_id, phenomenon_time, result_time, result };
                let id = public_id::encode(handle.series_id, phenomenon_time);
                yield MergeItem {
                    phenomenon_time,
                    stream_id: handle.stream_id,
                    foi_id: handle.foi_id,
                    payload: (id, record),
                };
            }
        } else {
            let mut scan = indexes.scan_series(handle.series_id, lower, upper);
            while let Some(entry) = scan.next().await {
                let (phenomenon_time, bytes) = entry?;
                let (foi_id, result_time, encoded) = record_key::deser_value(bytes)?;
                let result = encoding
                    .decode(&encoded)
                    .map_err(|e| StorageError::from(crate::keys::DeserializationError::Json(e.to_string())))?;
                let record = ObservationRecord { foi_id, phenomenon_time, result_time, result };
                let id = public_id::encode(handle.series_id, phenomenon_time);
                yield MergeItem {
                    phenomenon_time,
                    stream_id: handle.stream_id,
                    foi_id: handle.foi_id,
                    payload: (id, record),
                };
            }
        }
    };
    Box::pin(stream)
}

/// Narrows two temporal filters to their overlapping `[begin, end)`
/// range, used when a series' normalized phenomenon and result times
/// coincide (spec §4.4). `latestTime`/`currentTime` on either side still
/// wins over a plain range, since they express "don't range-scan, probe
/// for the single newest record" rather than a bound.
fn intersect(a: TemporalFilter, b: TemporalFilter) -> TemporalFilter {
    if a.wants_latest_only() {
        return a;
    }
    if b.wants_latest_only() {
        return b;
    }
    let (a_begin, a_end) = a.bounds();
    let (b_begin, b_end) = b.bounds();
    TemporalFilter::Range {
        begin: a_begin.max(b_begin),
        end: a_end.min(b_end),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use obsdb_common::{Instant, Scalar};
    use slatedb::Db;
    use slatedb::object_store::memory::InMemory;

    use crate::keys::registry_keys::{FieldDescriptor, FoiMeta, RecordStructure, SystemMeta};
    use crate::registry::streams::StreamIdStrategy;

    use super::*;

    async fn test_harness() -> (Registries, Indexes, StreamId, FoiId) {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store).build().await.unwrap();
        let registries = Registries::new(db.clone());
        let indexes = Indexes::new(db);

        let system_id = registries
            .create_system(SystemMeta {
                string_id: "sys-1".to_string(),
                name: "station".to_string(),
                description: None,
                sensorml_description: None,
                parent_group_id: None,
                valid_time_start: Instant::at(0, 0),
                outputs: vec![],
                control_inputs: vec![],
            })
            .await
            .unwrap();
        let stream_id = registries
            .create_stream(
                system_id,
                "temperature".to_string(),
                RecordStructure {
                    fields: vec![FieldDescriptor {
                        name: "value".to_string(),
                        observable_uri: None,
                        unit: None,
                    }],
                },
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::Sequential,
            )
            .await
            .unwrap();
        let foi_id = registries
            .create_foi(FoiMeta {
                string_id: "foi-1".to_string(),
                geometry_wkt: None,
                metadata: None,
            })
            .await
            .unwrap();
        (registries, indexes, stream_id, foi_id)
    }

    fn scalar_record(foi_id: FoiId, secs: i64, value: i64) -> ObservationRecord {
        ObservationRecord {
            foi_id,
            phenomenon_time: Instant::at(secs, 0),
            result_time: Instant::at(secs, 0),
            result: obsdb_common::ResultValue::Scalar(Scalar::Int(value)),
        }
    }

    #[tokio::test]
    async fn select_with_no_restriction_scans_everything() {
        let (registries, indexes, stream_id, foi_id) = test_harness().await;
        for secs in [10, 20, 30] {
            let record = scalar_record(foi_id, secs, secs);
            indexes
                .add(
                    stream_id,
                    foi_id,
                    record.phenomenon_time,
                    record.result_time,
                    RecordEncoding::Json,
                    &record,
                )
                .await
                .unwrap();
        }

        let planner = Planner::new(&indexes, &registries);
        let count = planner.count_matching(ObservationFilter::new()).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn select_by_stream_filters_to_that_stream() {
        let (registries, indexes, stream_id, foi_id) = test_harness().await;
        let record = scalar_record(foi_id, 1, 1);
        indexes
            .add(
                stream_id,
                foi_id,
                record.phenomenon_time,
                record.result_time,
                RecordEncoding::Json,
                &record,
            )
            .await
            .unwrap();

        let planner = Planner::new(&indexes, &registries);
        let filter = ObservationFilter::new().with_stream(stream_id);
        let count = planner.count_matching(filter).await.unwrap();
        assert_eq!(count, 1);

        let other_stream = StreamId::new(stream_id.get() + 999);
        let filter = ObservationFilter::new().with_stream(other_stream);
        let count = planner.count_matching(filter).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn value_predicate_filters_post_merge() {
        let (registries, indexes, stream_id, foi_id) = test_harness().await;
        for (secs, value) in [(1, 5), (2, 50)] {
            let record = scalar_record(foi_id, secs, value);
            indexes
                .add(
                    stream_id,
                    foi_id,
                    record.phenomenon_time,
                    record.result_time,
                    RecordEncoding::Json,
                    &record,
                )
                .await
                .unwrap();
        }

        let planner = Planner::new(&indexes, &registries);
        let filter = ObservationFilter::new().with_value_predicate(Arc::new(|value| {
            matches!(value, obsdb_common::ResultValue::Scalar(Scalar::Int(n)) if *n > 10)
        }));
        let count = planner.count_matching(filter).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let (registries, indexes, stream_id, foi_id) = test_harness().await;
        for secs in [1, 2, 3, 4] {
            let record = scalar_record(foi_id, secs, secs);
            indexes
                .add(
                    stream_id,
                    foi_id,
                    record.phenomenon_time,
                    record.result_time,
                    RecordEncoding::Json,
                    &record,
                )
                .await
                .unwrap();
        }

        let planner = Planner::new(&indexes, &registries);
        let filter = ObservationFilter::new().with_limit(2);
        let count = planner.count_matching(filter).await.unwrap();
        assert_eq!(count, 2);
    }
}
