//! Internal instrumentation (ambient stack, not spec-named): per-call
//! latency and cardinality histograms, gathered the same way as the
//! teacher's `lite/src/metrics.rs` but never served over HTTP — nothing
//! in this crate owns a listener, so `gather()` exists for an embedding
//! host to expose on its own `/metrics` endpoint if it wants to.

use std::sync::LazyLock;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use prometheus::{Encoder, Histogram, TextEncoder, register_histogram};

pub fn observe_write_latency(latency: Duration) {
    static HISTOGRAM: LazyLock<Histogram> = LazyLock::new(|| {
        register_histogram!(
            "obsdb_write_latency_seconds",
            "add/put/remove latency in seconds",
            vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000]
        )
        .unwrap()
    });
    HISTOGRAM.observe(latency.as_secs_f64());
}

pub fn observe_select_latency(latency: Duration) {
    static HISTOGRAM: LazyLock<Histogram> = LazyLock::new(|| {
        register_histogram!(
            "obsdb_select_latency_seconds",
            "selectEntries/selectResults end-to-end latency in seconds",
            vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500]
        )
        .unwrap()
    });
    HISTOGRAM.observe(latency.as_secs_f64());
}

/// Size of the planner's resolved driving set (spec §4.4) — the count of
/// series a query fanned out to before merging, regardless of how many
/// records each contributed.
pub fn observe_series_fanout(series_count: usize) {
    static HISTOGRAM: LazyLock<Histogram> = LazyLock::new(|| {
        register_histogram!(
            "obsdb_select_series_fanout",
            "number of series resolved per query",
            vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
        )
        .unwrap()
    });
    HISTOGRAM.observe(series_count as f64);
}

pub fn observe_histogram_bin_count(bin_count: usize) {
    static HISTOGRAM: LazyLock<Histogram> = LazyLock::new(|| {
        register_histogram!(
            "obsdb_statistics_bin_count",
            "number of bins produced per getStatistics series histogram",
            vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 400.0]
        )
        .unwrap()
    });
    HISTOGRAM.observe(bin_count as f64);
}

pub fn observe_compaction_reclaimed(reclaimed: u64) {
    static HISTOGRAM: LazyLock<Histogram> = LazyLock::new(|| {
        register_histogram!(
            "obsdb_compaction_reclaimed_series",
            "number of empty series reclaimed per compaction pass",
            vec![0.0, 1.0, 10.0, 100.0, 1000.0, 10000.0]
        )
        .unwrap()
    });
    HISTOGRAM.observe(reclaimed as f64);
}

pub fn gather() -> Bytes {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = BytesMut::new().writer();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    buffer.into_inner().freeze()
}
