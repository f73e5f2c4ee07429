//! The three correlated observation indexes (spec §4.1/§4.3): `ObsRecords`
//! (primary, keyed by `seriesId`+`phenomenonTime`), `SeriesByStream` and
//! `SeriesByFoi` (series lookup by the two natural access paths). Writes
//! that touch more than one of these go through a single `slatedb`
//! transaction, grounded on the teacher's `db.begin(IsolationLevel::
//! SerializableSnapshot)` / `txn.put` / `commit_with_options` shape
//! (`basins.rs`, `streams.rs`).

use async_stream::try_stream;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use obsdb_common::{FoiId, Instant, ObservationId, ObservationRecord, RecordEncoding, SeriesId, StreamId};
use slatedb::config::{DurabilityLevel, ReadOptions, ScanOptions, WriteOptions};
use slatedb::{Db, IsolationLevel, WriteBatch};

use crate::error::{AddObservationError, CorruptionError, PutObservationError, RemoveObservationError, StorageError, StreamRetiredError, UnknownStreamError};
use crate::keys::registry_keys::{self, CounterKind, StreamMeta, StreamState};
use crate::keys::{public_id, record_key, series_by_foi_key, series_key};
use crate::ordered_map::SlateTransactionMap;
use crate::registry::next_id;

const WRITE_OPTS: WriteOptions = WriteOptions {
    await_durable: true,
};

const GET_OPTS: ReadOptions = ReadOptions {
    durability_filter: DurabilityLevel::Memory,
    dirty: false,
    cache_blocks: true,
};

const SCAN_OPTS: ScanOptions = ScanOptions {
    durability_filter: DurabilityLevel::Memory,
    dirty: false,
    read_ahead_bytes: 1024 * 1024,
    cache_blocks: true,
    max_fetch_tasks: 4,
};

/// A resolved series of one stream observing one feature of interest,
/// yielded by the planner's per-stream/per-foi scans before it fans out
/// into per-series record scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesHandle {
    pub series_id: SeriesId,
    pub stream_id: StreamId,
    pub foi_id: FoiId,
    pub result_time: Instant,
}

/// Failure inside the shared `add`/`put` write path, before it is
/// narrowed to the public error type of either entry point.
#[derive(Debug, Clone, thiserror::Error)]
enum WriteObservationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    UnknownStream(#[from] UnknownStreamError),
    #[error(transparent)]
    StreamRetired(#[from] StreamRetiredError),
}

impl From<WriteObservationError> for AddObservationError {
    fn from(value: WriteObservationError) -> Self {
        match value {
            WriteObservationError::Storage(e) => e.into(),
            WriteObservationError::UnknownStream(e) => e.into(),
            WriteObservationError::StreamRetired(e) => e.into(),
        }
    }
}

impl From<WriteObservationError> for PutObservationError {
    fn from(value: WriteObservationError) -> Self {
        match value {
            WriteObservationError::Storage(e) => e.into(),
            WriteObservationError::UnknownStream(e) => e.into(),
            WriteObservationError::StreamRetired(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct Indexes {
    db: Db,
}

impl Indexes {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn resolve_or_create_series(
        map: &SlateTransactionMap<'_>,
        stream_id: StreamId,
        foi_id: FoiId,
        result_time: Instant,
    ) -> Result<SeriesId, StorageError> {
        let key = series_key::ser_key(stream_id, foi_id, result_time);
        if let Some(existing) = map.get(key.clone()).await? {
            return Ok(series_key::deser_value(existing)?);
        }
        let series_id = SeriesId::new(next_id(map, CounterKind::Series).await?);
        map.put(key, series_key::ser_value(series_id))?;
        map.put(
            series_by_foi_key::ser_key(foi_id, stream_id, result_time),
            series_by_foi_key::ser_value(),
        )?;
        Ok(series_id)
    }

    /// Inserts (or overwrites, if one already exists at the same
    /// `(seriesId, phenomenonTime)`) the observation record, resolving
    /// or creating its series first. `add` and `put` (spec's two
    /// ObsStore write entry points) share this path — they differ only
    /// in which public error type the caller sees; nothing about the
    /// underlying mutation differs between a fresh insert and a
    /// replace-in-place.
    async fn write_observation(
        &self,
        stream_id: StreamId,
        foi_id: FoiId,
        phenomenon_time: Instant,
        result_time: Instant,
        encoding: RecordEncoding,
        record: &ObservationRecord,
    ) -> Result<ObservationId, WriteObservationError> {
        let encoded = encoding.encode(&record.result).map_err(|e| {
            WriteObservationError::Storage(StorageError::from(crate::keys::DeserializationError::Json(
                e.to_string(),
            )))
        })?;

        let txn = self.db.begin(IsolationLevel::SerializableSnapshot).await?;
        let map = SlateTransactionMap::new(&txn);

        let meta_bytes = map
            .get(registry_keys::ser_stream_meta_key(stream_id))
            .await?
            .ok_or(UnknownStreamError(stream_id))?;
        let meta: StreamMeta = registry_keys::deser_stream_meta_value(meta_bytes).map_err(StorageError::from)?;
        if meta.state == StreamState::Retired {
            return Err(StreamRetiredError(stream_id).into());
        }

        // Spec §4.3 step 1: a record whose resultTime coincides with its
        // phenomenonTime belongs to the series normalized to -infinity, not
        // to a one-off series keyed by that instant — the series key always
        // sees the normalized value, while the stored record keeps the real
        // one below.
        let series_result_time = if result_time == phenomenon_time { Instant::NegInfinity } else { result_time };
        let series_id = Self::resolve_or_create_series(&map, stream_id, foi_id, series_result_time).await?;

        map.put(
            record_key::ser_key(series_id, phenomenon_time),
            record_key::ser_value(foi_id, result_time, &encoded),
        )?;

        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(public_id::encode(series_id, phenomenon_time))
    }

    pub async fn add(
        &self,
        stream_id: StreamId,
        foi_id: FoiId,
        phenomenon_time: Instant,
        result_time: Instant,
        encoding: RecordEncoding,
        record: &ObservationRecord,
    ) -> Result<ObservationId, AddObservationError> {
        self.write_observation(stream_id, foi_id, phenomenon_time, result_time, encoding, record)
            .await
            .map_err(Into::into)
    }

    pub async fn put(
        &self,
        stream_id: StreamId,
        foi_id: FoiId,
        phenomenon_time: Instant,
        result_time: Instant,
        encoding: RecordEncoding,
        record: &ObservationRecord,
    ) -> Result<ObservationId, PutObservationError> {
        self.write_observation(stream_id, foi_id, phenomenon_time, result_time, encoding, record)
            .await
            .map_err(Into::into)
    }

    /// Removes one observation record. A malformed or already-absent id
    /// is not an error (spec §4.3) — returns `false` either way. Leaves
    /// the series' `SeriesByStream`/`SeriesByFoi` entries in place even
    /// if this was the series' last record; an empty series is reclaimed
    /// only by explicit compaction (`compaction::run`).
    pub async fn remove(&self, id: &ObservationId) -> Result<bool, RemoveObservationError> {
        let Some((series_id, phenomenon_time)) = public_id::decode(id) else {
            return Ok(false);
        };
        let key = record_key::ser_key(series_id, phenomenon_time);
        let existed = self.db.get_with_options(key.clone(), &GET_OPTS).await?.is_some();
        if existed {
            let mut batch = WriteBatch::new();
            batch.delete(key);
            self.db.write_with_options(batch, &WRITE_OPTS).await?;
        }
        Ok(existed)
    }

    pub async fn get(&self, id: &ObservationId, encoding: RecordEncoding) -> Result<Option<ObservationRecord>, StorageError> {
        let Some((series_id, phenomenon_time)) = public_id::decode(id) else {
            return Ok(None);
        };
        let key = record_key::ser_key(series_id, phenomenon_time);
        let Some(bytes) = self.db.get_with_options(key, &GET_OPTS).await? else {
            return Ok(None);
        };
        let (foi_id, result_time, encoded_result) = record_key::deser_value(bytes)?;
        let result = encoding.decode(&encoded_result).map_err(|e| {
            StorageError::from(crate::keys::DeserializationError::Json(e.to_string()))
        })?;
        Ok(Some(ObservationRecord {
            foi_id,
            phenomenon_time,
            result_time,
            result,
        }))
    }

    /// Lazily scans every record of one series within `[lower, upper]`
    /// phenomenon time, in ascending order — the planner's innermost
    /// fan-out unit (spec §4.4), shaped after the teacher's
    /// `async_stream::try_stream!`-over-`scan_with_options` pull model
    /// (`lite/src/backend/read.rs`).
    pub fn scan_series(
        &self,
        series_id: SeriesId,
        lower: Instant,
        upper: Instant,
    ) -> BoxStream<'static, Result<(Instant, Bytes), StorageError>> {
        let db = self.db.clone();
        let start = record_key::ser_key(series_id, lower);
        let end_inclusive = record_key::ser_key(series_id, upper);
        let stream = try_stream! {
            let mut it = db.scan_with_options(start..=end_inclusive, &SCAN_OPTS).await?;
            while let Some(kv) = it.next().await? {
                let (_, phenomenon_time) = record_key::deser_key(kv.key)?;
                yield (phenomenon_time, kv.value);
            }
        };
        Box::pin(stream)
    }

    /// Every series in the store (spec §4.4 "none/none: full scan of
    /// `SeriesByStream`"), in `SeriesByStream`'s own byte order.
    pub fn all_series(&self) -> BoxStream<'static, Result<SeriesHandle, StorageError>> {
        let db = self.db.clone();
        let range = crate::keys::key_type_range(crate::keys::KeyType::SeriesByStream);
        let stream = try_stream! {
            let mut it = db.scan_with_options(range, &SCAN_OPTS).await?;
            while let Some(kv) = it.next().await? {
                let (stream_id, foi_id, result_time) = series_key::deser_key(kv.key)?;
                let series_id = series_key::deser_value(kv.value)?;
                yield SeriesHandle { series_id, stream_id, foi_id, result_time };
            }
        };
        Box::pin(stream)
    }

    /// All series of one stream (spec §4.4 "driving set = stream"):
    /// `(foiId, resultTime) -> seriesId`, in `resultTime` order.
    pub fn series_for_stream(&self, stream_id: StreamId) -> BoxStream<'static, Result<SeriesHandle, StorageError>> {
        let db = self.db.clone();
        let range = series_key::stream_prefix_range(stream_id);
        let stream = try_stream! {
            let mut it = db.scan_with_options(range, &SCAN_OPTS).await?;
            while let Some(kv) = it.next().await? {
                let (stream_id, foi_id, result_time) = series_key::deser_key(kv.key)?;
                let series_id = series_key::deser_value(kv.value)?;
                yield SeriesHandle { series_id, stream_id, foi_id, result_time };
            }
        };
        Box::pin(stream)
    }

    /// All series of one feature of interest (spec §4.4 "driving set =
    /// foi"): scans `SeriesByFoi`, then "inflates" each entry by
    /// re-deriving the equivalent `SeriesByStream` key and looking up
    /// its `seriesId` there.
    pub fn series_for_foi(&self, foi_id: FoiId) -> BoxStream<'static, Result<SeriesHandle, StorageError>> {
        let db = self.db.clone();
        let range = series_by_foi_key::foi_prefix_range(foi_id);
        let stream = try_stream! {
            let mut it = db.scan_with_options(range, &SCAN_OPTS).await?;
            while let Some(kv) = it.next().await? {
                let (foi_id, stream_id, result_time) = series_by_foi_key::deser_key(kv.key)?;
                series_by_foi_key::deser_value(kv.value)?;
                let inflate_key = series_key::ser_key(stream_id, foi_id, result_time);
                let Some(value) = db.get_with_options(inflate_key, &GET_OPTS).await? else {
                    return Err(StorageError::from(CorruptionError(format!(
                        "SeriesByFoi entry (foi={foi_id:?}, stream={stream_id:?}, resultTime={result_time:?}) has no matching SeriesByStream entry"
                    ))));
                };
                let series_id = series_key::deser_value(value)?;
                yield SeriesHandle { series_id, stream_id, foi_id, result_time };
            }
        };
        Box::pin(stream)
    }

    /// Cascading stream removal (spec §4.3): walks every series of
    /// `stream_id`, deletes its records plus its `SeriesByStream`/
    /// `SeriesByFoi` entries. Callers still owe a separate call to
    /// `Registries::delete_stream_registration` for the stream's own
    /// metadata — the two registries have no visibility into each
    /// other (DESIGN.md Open Question 4).
    pub async fn delete_stream_cascade(&self, stream_id: StreamId) -> Result<(), StorageError> {
        let mut handles = self.series_for_stream(stream_id);
        while let Some(handle) = handles.next().await {
            let handle = handle?;
            let mut batch = WriteBatch::new();
            let mut records = self
                .db
                .scan_with_options(
                    record_key::series_lower_bound(handle.series_id)
                        ..=record_key::series_upper_bound(handle.series_id),
                    &SCAN_OPTS,
                )
                .await?;
            while let Some(kv) = records.next().await? {
                batch.delete(kv.key);
            }
            batch.delete(series_key::ser_key(handle.stream_id, handle.foi_id, handle.result_time));
            batch.delete(series_by_foi_key::ser_key(handle.foi_id, handle.stream_id, handle.result_time));
            self.db.write_with_options(batch, &WRITE_OPTS).await?;
        }
        Ok(())
    }

    /// True if `series_id` owns no records (spec §4.7 compaction: a
    /// candidate for index reclamation). One bounded probe rather than a
    /// full scan.
    pub async fn is_series_empty(&self, series_id: SeriesId) -> Result<bool, StorageError> {
        let range = record_key::series_lower_bound(series_id)..=record_key::series_upper_bound(series_id);
        let mut it = self.db.scan_with_options(range, &SCAN_OPTS).await?;
        Ok(it.next().await?.is_none())
    }

    /// Deletes one series' `SeriesByStream`/`SeriesByFoi` entries, leaving
    /// every other series of the same stream untouched. Callers must have
    /// already established the series owns no records — this does not
    /// re-check (`compaction::run` holds that invariant).
    pub async fn delete_series_index(&self, handle: SeriesHandle) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(series_key::ser_key(handle.stream_id, handle.foi_id, handle.result_time));
        batch.delete(series_by_foi_key::ser_key(handle.foi_id, handle.stream_id, handle.result_time));
        self.db.write_with_options(batch, &WRITE_OPTS).await?;
        Ok(())
    }

    /// Full-index scan over `ObsRecords`, for `Store::num_records`/`size`
    /// (spec §6 `ObsStore.numRecords`/`.size` — documented as the same
    /// count here, see DESIGN.md Open Question 7).
    pub async fn count_all_records(&self) -> Result<u64, StorageError> {
        let range = crate::keys::key_type_range(crate::keys::KeyType::ObsRecord);
        let mut it = self.db.scan_with_options(range, &SCAN_OPTS).await?;
        let mut count = 0u64;
        while it.next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
