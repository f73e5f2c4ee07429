//! Histogram/statistics engine (spec §4.5): buckets matched observations
//! into fixed-width time bins and accumulates count/min/max/sum per bin.
//! Grounded on the planner's merge path (`planner.rs`) rather than the
//! rank-arithmetic two-probe formula spec §4.5 describes — picking an
//! auto bin width needs the matched set's full time span up front, so
//! this buffers the merged stream once instead of probing
//! `ceiling`/`floor` per bin (see DESIGN.md Open Question 5 on
//! `OrderedMap`'s own scan-based `floor`/`rank`, which the same
//! trade-off already accepts).

use std::collections::HashMap;

use futures::StreamExt;
use obsdb_common::{
    BinWidth, FoiId, Instant, TemporalFilter, BIN_WIDTH_LADDER_SECS, HistogramBin, ObsStats, StatisticsRequest,
};

use crate::error::GetStatisticsError;
use crate::metrics;
use crate::planner::Planner;

/// One histogram result: `group` names the feature of interest it
/// summarizes, or is `None` when `aggregate_fois` folded every matched
/// series into one (spec §4.5). Stream identity isn't preserved past the
/// planner's merge, so grouping is by foi alone — the common case of a
/// single-stream filter makes this equivalent to "one histogram per
/// series" in practice.
#[derive(Debug, Clone)]
pub struct SeriesHistogram {
    pub group: Option<FoiId>,
    pub bin_width_secs: u64,
    pub bins: Vec<HistogramBin>,
    /// Total matched observation count for this group (spec §4.5
    /// `totalObsCount`) — independent of how many bins turned out non-empty.
    pub total_obs_count: u64,
    pub phenomenon_time_range: Option<(Instant, Instant)>,
    pub result_time_range: Option<(Instant, Instant)>,
}

/// Picks the ladder entry nearest `span_secs / 200`, clamped to the
/// ladder's bounds (spec §4.5 "targets roughly 100-200 bins").
fn auto_bin_width(span_secs: u64) -> u64 {
    let target = (span_secs / 200).max(1);
    BIN_WIDTH_LADDER_SECS
        .iter()
        .copied()
        .min_by_key(|&width| width.abs_diff(target))
        .unwrap_or(*BIN_WIDTH_LADDER_SECS.last().unwrap())
}

/// Upper bound on bins a single histogram may allocate (spec §4.5 names
/// no such cap explicitly, but an explicit `binWidth` paired with a wide
/// query window is otherwise unbounded — same spirit as the planner's
/// own `TooBroad` cap on resolved stream ids).
const MAX_BINS: u64 = 200_000;

fn seconds_of(instant: Instant) -> Option<i64> {
    match instant {
        Instant::At { seconds, .. } => Some(seconds),
        _ => None,
    }
}

/// Resolves the `[start, end]` window a histogram's bins are laid out
/// against (spec §4.5: "durationSeconds = end - start" of the *query's*
/// phenomenon-time range). An explicit, finite `Range` filter wins; any
/// other filter (`AllTimes`, `CurrentTime`, `LatestTime`, `At`, or a
/// `Range` with an infinite endpoint) has no fixed window of its own, so
/// the matched records' own min/max phenomenon time stands in instead.
fn resolve_window(temporal: TemporalFilter, group_records: &[&obsdb_common::ObservationRecord]) -> (i64, i64) {
    if let TemporalFilter::Range { begin, end } = temporal {
        if let (Some(start), Some(end)) = (seconds_of(begin), seconds_of(end)) {
            return (start, end.max(start));
        }
    }
    let seconds: Vec<i64> = group_records.iter().filter_map(|r| seconds_of(r.phenomenon_time)).collect();
    let start = seconds.iter().copied().min().unwrap_or(0);
    let end = seconds.iter().copied().max().unwrap_or(0);
    (start, end)
}

pub async fn get_statistics(
    planner: &Planner<'_>,
    request: StatisticsRequest,
) -> Result<Vec<SeriesHistogram>, GetStatisticsError> {
    let aggregate_fois = request.aggregate_fois;
    let bin_width = request.bin_width;
    let phenomenon_time = request.filter.phenomenon_time_or_all();

    let mut stream = planner.select(request.filter).await?;
    let mut records = Vec::new();
    while let Some(item) = stream.next().await {
        let (_, record) = item?;
        records.push(record);
    }

    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_foi: HashMap<Option<FoiId>, Vec<&obsdb_common::ObservationRecord>> = HashMap::new();
    for record in &records {
        let key = if aggregate_fois { None } else { Some(record.foi_id) };
        by_foi.entry(key).or_default().push(record);
    }

    let mut results = Vec::new();
    for (foi_key, group_records) in by_foi {
        let (start_secs, end_secs) = resolve_window(phenomenon_time, &group_records);
        let duration = (end_secs - start_secs).max(0) as u64;

        let width = match bin_width {
            BinWidth::Explicit(d) => d.seconds.max(1),
            BinWidth::Auto => auto_bin_width(duration),
        };
        let bin_count_u64 = duration.div_ceil(width).max(1);
        if bin_count_u64 > MAX_BINS {
            return Err(GetStatisticsError::TooManyBins {
                requested: bin_count_u64,
                cap: MAX_BINS,
            });
        }
        let bin_count = bin_count_u64 as usize;

        let mut bins: Vec<ObsStats> = (0..bin_count).map(|_| ObsStats::empty()).collect();
        for record in &group_records {
            let Some(secs) = seconds_of(record.phenomenon_time) else { continue };
            let offset = (secs - start_secs).max(0) as u64;
            let bin_index = ((offset / width) as usize).min(bin_count - 1);
            bins[bin_index].observe(record.result.as_f64());
        }

        let histogram_bins = bins
            .into_iter()
            .enumerate()
            .map(|(idx, stats)| HistogramBin {
                begin_offset_secs: idx as u64 * width,
                end_offset_secs: (idx as u64 + 1) * width,
                stats,
            })
            .collect::<Vec<_>>();

        let phenomenon_time_range = group_records.iter().map(|r| r.phenomenon_time).min().zip(
            group_records.iter().map(|r| r.phenomenon_time).max(),
        );
        let result_time_range = group_records
            .iter()
            .map(|r| r.result_time)
            .min()
            .zip(group_records.iter().map(|r| r.result_time).max());

        metrics::observe_histogram_bin_count(histogram_bins.len());
        results.push(SeriesHistogram {
            group: foi_key,
            bin_width_secs: width,
            bins: histogram_bins,
            total_obs_count: group_records.len() as u64,
            phenomenon_time_range,
            result_time_range,
        });
    }

    results.sort_by_key(|h| h.group.map(|foi| foi.get()));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use obsdb_common::{ObservationFilter, ObservationRecord, RecordEncoding, Scalar, StreamId};
    use slatedb::Db;
    use slatedb::object_store::memory::InMemory;

    use crate::indexes::Indexes;
    use crate::keys::registry_keys::{FieldDescriptor, FoiMeta, RecordStructure, SystemMeta};
    use crate::registry::streams::StreamIdStrategy;
    use crate::registry::Registries;

    use super::*;

    async fn harness() -> (Registries, Indexes, StreamId, FoiId) {
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

    #[tokio::test]
    async fn explicit_bin_width_buckets_by_offset() {
        let (registries, indexes, stream_id, foi_id) = harness().await;
        for (secs, value) in [(0, 1), (5, 2), (15, 3)] {
            let record = ObservationRecord {
                foi_id,
                phenomenon_time: Instant::at(secs, 0),
                result_time: Instant::at(secs, 0),
                result: obsdb_common::ResultValue::Scalar(Scalar::Int(value)),
            };
            indexes
                .add(stream_id, foi_id, record.phenomenon_time, record.result_time, RecordEncoding::Json, &record)
                .await
                .unwrap();
        }

        let planner = Planner::new(&indexes, &registries);
        let request = StatisticsRequest {
            filter: ObservationFilter::new(),
            bin_width: BinWidth::Explicit(obsdb_common::Duration::from_secs(10)),
            aggregate_fois: false,
        };
        let histograms = get_statistics(&planner, request).await.unwrap();
        assert_eq!(histograms.len(), 1);
        let bins = &histograms[0].bins;
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].stats.count, 2);
        assert_eq!(bins[1].stats.count, 1);
        assert_eq!(histograms[0].total_obs_count, 3);
        assert_eq!(
            histograms[0].phenomenon_time_range,
            Some((Instant::at(0, 0), Instant::at(15, 0)))
        );
    }

    #[tokio::test]
    async fn explicit_range_filter_drives_bin_offsets_not_record_span() {
        let (registries, indexes, stream_id, foi_id) = harness().await;
        for (secs, value) in [(50, 1), (70, 2)] {
            let record = ObservationRecord {
                foi_id,
                phenomenon_time: Instant::at(secs, 0),
                result_time: Instant::at(secs, 0),
                result: obsdb_common::ResultValue::Scalar(Scalar::Int(value)),
            };
            indexes
                .add(stream_id, foi_id, record.phenomenon_time, record.result_time, RecordEncoding::Json, &record)
                .await
                .unwrap();
        }

        let planner = Planner::new(&indexes, &registries);
        let request = StatisticsRequest {
            filter: ObservationFilter::new().with_phenomenon_time(obsdb_common::TemporalFilter::Range {
                begin: Instant::at(0, 0),
                end: Instant::at(100, 0),
            }),
            bin_width: BinWidth::Explicit(obsdb_common::Duration::from_secs(25)),
            aggregate_fois: false,
        };
        let histograms = get_statistics(&planner, request).await.unwrap();
        assert_eq!(histograms.len(), 1);
        // Window is [0, 100) per the filter, not [50, 70) per the records,
        // so offsets are relative to 0 and there are 4 bins, not 1.
        let bins = &histograms[0].bins;
        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].stats.count, 0);
        assert_eq!(bins[1].stats.count, 0);
        assert_eq!(bins[2].stats.count, 2); // secs 50 and 70 both land in [50, 75)
        assert_eq!(bins[2].begin_offset_secs, 50);
        assert_eq!(bins[3].stats.count, 0);
    }

    #[tokio::test]
    async fn empty_match_set_yields_no_histograms() {
        let (registries, indexes, _, _) = harness().await;
        let planner = Planner::new(&indexes, &registries);
        let request = StatisticsRequest {
            filter: ObservationFilter::new(),
            bin_width: BinWidth::Auto,
            aggregate_fois: false,
        };
        let histograms = get_statistics(&planner, request).await.unwrap();
        assert!(histograms.is_empty());
    }

    #[tokio::test]
    async fn narrow_explicit_bin_width_over_wide_range_is_rejected() {
        let (registries, indexes, stream_id, foi_id) = harness().await;
        let record = ObservationRecord {
            foi_id,
            phenomenon_time: Instant::at(0, 0),
            result_time: Instant::at(0, 0),
            result: obsdb_common::ResultValue::Scalar(Scalar::Int(1)),
        };
        indexes
            .add(stream_id, foi_id, record.phenomenon_time, record.result_time, RecordEncoding::Json, &record)
            .await
            .unwrap();

        let planner = Planner::new(&indexes, &registries);
        let request = StatisticsRequest {
            filter: ObservationFilter::new().with_phenomenon_time(obsdb_common::TemporalFilter::Range {
                begin: Instant::at(0, 0),
                end: Instant::at(i64::MAX, 0),
            }),
            bin_width: BinWidth::Explicit(obsdb_common::Duration::from_secs(1)),
            aggregate_fois: false,
        };
        let result = get_statistics(&planner, request).await;
        assert!(matches!(result, Err(GetStatisticsError::TooManyBins { .. })));
    }
}
