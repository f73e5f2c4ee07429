//! Command handlers: one function per [`crate::cli::Command`] variant,
//! printing results with `tabled`/`colored` the way the teacher's
//! `ops.rs` renders basin/stream listings.

use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use colored::Colorize;
use futures::StreamExt;
use obsdb_common::{
    BinWidth, Duration, FoiId, Instant, ObservationFilter, RecordEncoding, StatisticsRequest, StreamId, SystemId,
};
use obsdb_store::Store;
use tabled::{Table, Tabled};

use crate::cli::{IngestArgs, QueryArgs, RegisterFoiArgs, RegisterStreamArgs, RegisterSystemArgs, StatsArgs};
use crate::error::CliError;
use crate::record_format::{RecordsIn, parse_line};

fn fmt_instant(instant: Instant) -> String {
    match instant {
        Instant::NegInfinity => "-inf".to_string(),
        Instant::PosInfinity => "+inf".to_string(),
        Instant::At { seconds, nanos } => {
            let since_epoch = if seconds >= 0 {
                UNIX_EPOCH.checked_add(StdDuration::new(seconds as u64, nanos))
            } else {
                UNIX_EPOCH.checked_sub(StdDuration::new((-seconds) as u64, 0))
            };
            match since_epoch {
                Some(time) => humantime::format_rfc3339_seconds(time).to_string(),
                None => format!("{seconds}.{nanos:09}"),
            }
        }
    }
}

pub async fn register_system(store: &Store, args: RegisterSystemArgs) -> Result<(), CliError> {
    let meta = obsdb_store::keys::registry_keys::SystemMeta {
        string_id: args.string_id,
        name: args.name,
        description: args.description,
        sensorml_description: None,
        parent_group_id: None,
        valid_time_start: Instant::at(args.valid_time_start_secs, 0),
        outputs: vec![],
        control_inputs: vec![],
    };
    let id = store.get_or_create_system(meta).await?;
    println!("{} {}", "system id:".green(), id);
    Ok(())
}

pub async fn get_system(store: &Store, system_id: u64) -> Result<(), CliError> {
    let meta = store.get_system(SystemId(system_id)).await?;
    println!("{meta:#?}");
    Ok(())
}

pub async fn register_foi(store: &Store, args: RegisterFoiArgs) -> Result<(), CliError> {
    let meta = obsdb_store::keys::registry_keys::FoiMeta {
        string_id: args.string_id,
        geometry_wkt: args.geometry_wkt,
        metadata: args.metadata,
    };
    let id = store.get_or_create_foi(meta).await?;
    println!("{} {}", "foi id:".green(), id);
    Ok(())
}

pub async fn get_foi(store: &Store, foi_id: u64) -> Result<(), CliError> {
    let meta = store.get_foi(FoiId(foi_id)).await?;
    println!("{meta:#?}");
    Ok(())
}

pub async fn register_stream(store: &Store, args: RegisterStreamArgs) -> Result<(), CliError> {
    let structure = obsdb_store::keys::registry_keys::RecordStructure {
        fields: args
            .fields
            .into_iter()
            .map(|name| obsdb_store::keys::registry_keys::FieldDescriptor {
                name,
                observable_uri: None,
                unit: None,
            })
            .collect(),
    };
    let id = store
        .get_or_create_stream(
            SystemId(args.system_id),
            args.output_name,
            structure,
            RecordEncoding::Json,
            Instant::at(args.valid_time_start_secs, 0),
        )
        .await?;
    println!("{} {}", "stream id:".green(), id);
    Ok(())
}

pub async fn get_stream(store: &Store, stream_id: u64) -> Result<(), CliError> {
    let meta = store.get_stream(StreamId(stream_id)).await?;
    println!("{meta:#?}");
    Ok(())
}

pub async fn retire_stream(store: &Store, stream_id: u64, end_time_secs: i64) -> Result<(), CliError> {
    store
        .retire_stream(StreamId(stream_id), Instant::at(end_time_secs, 0))
        .await?;
    println!("{}", "stream retired".green());
    Ok(())
}

pub async fn delete_stream(store: &Store, stream_id: u64) -> Result<(), CliError> {
    store.delete_stream(StreamId(stream_id)).await?;
    println!("{}", "stream deleted".green());
    Ok(())
}

pub async fn ingest(store: &Store, args: IngestArgs) -> Result<(), CliError> {
    let source = match args.file {
        Some(path) => RecordsIn::File(path),
        None => RecordsIn::Stdin,
    };
    let mut lines = source.lines().await?;
    let stream_id = StreamId(args.stream_id);
    let mut count = 0u64;
    let mut line_no = 0u64;
    while let Some(line) = lines.next().await {
        line_no += 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let observation = parse_line(line_no, &line)?;
        if args.upsert {
            store.put(stream_id, observation, RecordEncoding::Json).await?;
        } else {
            store.add(stream_id, observation, RecordEncoding::Json).await?;
        }
        count += 1;
    }
    println!("{} {count}", "ingested:".green());
    Ok(())
}

pub async fn remove(store: &Store, observation_id: String) -> Result<(), CliError> {
    let bytes = parse_hex(&observation_id)?;
    let id = obsdb_common::ObservationId(bytes);
    let removed = store.remove(&id).await?;
    if removed {
        println!("{}", "observation removed".green());
    } else {
        println!("{}", "no such observation".yellow());
    }
    Ok(())
}

fn parse_hex(s: &str) -> Result<bytes::Bytes, CliError> {
    if s.len() % 2 != 0 {
        return Err(CliError::InvalidObservationId(s.to_string()));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let digits = s.as_bytes();
    for pair in digits.chunks(2) {
        let hi = hex_digit(pair[0]).ok_or_else(|| CliError::InvalidObservationId(s.to_string()))?;
        let lo = hex_digit(pair[1]).ok_or_else(|| CliError::InvalidObservationId(s.to_string()))?;
        out.push((hi << 4) | lo);
    }
    Ok(bytes::Bytes::from(out))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn build_filter(streams: Vec<u64>, fois: Vec<u64>, limit: Option<usize>) -> ObservationFilter {
    let mut filter = ObservationFilter::new();
    for stream_id in streams {
        filter = filter.with_stream(StreamId(stream_id));
    }
    for foi_id in fois {
        filter = filter.with_foi(FoiId(foi_id));
    }
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }
    filter
}

#[derive(Tabled)]
struct ObservationRow {
    #[tabled(rename = "id")]
    id: String,
    foi_id: u64,
    phenomenon_time: String,
    result_time: String,
    result: String,
}

pub async fn select(store: &Store, args: QueryArgs) -> Result<(), CliError> {
    let filter = build_filter(args.streams, args.fois, args.limit);
    let mut entries = store.select_entries(filter).await?;
    let mut rows = Vec::new();
    while let Some(entry) = entries.next().await {
        let (id, record) = entry?;
        rows.push(ObservationRow {
            id: id.to_string(),
            foi_id: record.foi_id.get(),
            phenomenon_time: fmt_instant(record.phenomenon_time),
            result_time: fmt_instant(record.result_time),
            result: serde_json::to_string(&record.result).unwrap_or_default(),
        });
    }
    println!("{}", Table::new(rows));
    Ok(())
}

pub async fn count(store: &Store, args: QueryArgs) -> Result<(), CliError> {
    let filter = build_filter(args.streams, args.fois, args.limit);
    let total = store.count_matching_entries(filter).await?;
    println!("{} {total}", "count:".green());
    Ok(())
}

#[derive(Tabled)]
struct HistogramRow {
    foi_id: String,
    bin_start_secs: u64,
    bin_end_secs: u64,
    count: u64,
    min: String,
    max: String,
    mean: String,
}

pub async fn stats(store: &Store, args: StatsArgs) -> Result<(), CliError> {
    let filter = build_filter(args.streams, args.fois, None);
    let bin_width = match args.bin_width_secs {
        Some(secs) => BinWidth::Explicit(Duration::from_secs(secs)),
        None => BinWidth::Auto,
    };
    let request = StatisticsRequest {
        filter,
        bin_width,
        aggregate_fois: args.aggregate_fois,
    };
    let histograms = store.get_statistics(request).await?;
    let mut rows = Vec::new();
    for histogram in &histograms {
        let foi_label = histogram
            .group
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(all)".to_string());
        for bin in &histogram.bins {
            rows.push(HistogramRow {
                foi_id: foi_label.clone(),
                bin_start_secs: bin.begin_offset_secs,
                bin_end_secs: bin.end_offset_secs,
                count: bin.stats.count,
                min: bin.stats.min.map(|v| v.to_string()).unwrap_or_default(),
                max: bin.stats.max.map(|v| v.to_string()).unwrap_or_default(),
                mean: bin.stats.mean().map(|v| v.to_string()).unwrap_or_default(),
            });
        }
    }
    println!("{}", Table::new(rows));
    for histogram in &histograms {
        println!(
            "{} total_obs={} bin_width_secs={}",
            "summary:".green(),
            histogram.total_obs_count,
            histogram.bin_width_secs
        );
    }
    Ok(())
}

pub async fn num_records(store: &Store) -> Result<(), CliError> {
    let total = store.num_records().await?;
    println!("{} {total}", "num_records:".green());
    Ok(())
}

pub async fn clear(store: &Store) -> Result<(), CliError> {
    store.clear().await?;
    println!("{}", "store cleared".green());
    Ok(())
}
