//! Top-level `Store` (spec §6): wires the registries, observation
//! indexes, planner, and write gate together behind the public
//! `ObsStore`-shaped API. Grounded on the teacher's `lite/src/server.rs`
//! startup sequence — open `slatedb::Db` against the configured object
//! store, hand it to the backend, accept traffic.

use bytesize::ByteSize;
use futures::StreamExt;
use futures::stream::BoxStream;
use obsdb_common::{
    FoiId, Instant, Observation, ObservationFilter, ObservationId, ObservationRecord, RecordEncoding, StreamId,
    SystemId,
};
use slatedb::Db;
use slatedb::config::{CompressionCodec, ObjectStoreCacheOptions, Settings};
use tracing::info;

use crate::config::StartConfig;
use crate::error::{
    AddObservationError, CreateStreamError, CreateSystemError, DeleteStreamError, GetFoiError, GetStatisticsError,
    GetStreamError, GetSystemError, PutObservationError, RemoveObservationError, SelectError, StartError,
};
use crate::indexes::Indexes;
use crate::keys::registry_keys::{FoiMeta, RecordStructure, StreamMeta, SystemMeta};
use crate::metrics;
use crate::planner::Planner;
use crate::registry::streams::StreamIdStrategy;
use crate::registry::Registries;
use crate::stats::{self, SeriesHistogram};
use crate::txn::WriteGate;

/// The observation storage engine (spec §6 `ObsStore`). One `Store`
/// embeds one `slatedb::Db`; `registries` and `indexes` partition its key
/// space rather than holding separate engines (see DESIGN.md Open
/// Question 4).
pub struct Store {
    registries: Registries,
    indexes: Indexes,
    gate: WriteGate,
    stream_id_strategy: StreamIdStrategy,
}

impl Store {
    /// Opens (or creates) the store at `config.storage_path` (spec §6
    /// `start(config)`): validates the path, opens `slatedb::Db` against
    /// `config.object_store`, and is ready to accept traffic immediately
    /// — `slatedb` replays its own WAL on open, standing in for the
    /// spec's described crash-recovery replay (scenario S6).
    pub async fn start(config: StartConfig) -> Result<Self, StartError> {
        config.validate_storage_path()?;
        let path = config.storage_path.to_string_lossy().into_owned();

        // {cacheBytes, autoCommitBytes, compression} (spec §6 `start(config)`)
        // map onto slatedb's own cache/flush/compression knobs, following the
        // teacher's `Settings::default()` + field overrides then
        // `.with_settings(...)` chain (`lite/src/server.rs`).
        let cache_bytes = config.memory_cache_kb.saturating_mul(1024);
        let mut settings = Settings::default();
        settings.object_store_cache_options = ObjectStoreCacheOptions {
            max_cache_size_bytes: Some(cache_bytes as usize),
            ..settings.object_store_cache_options
        };
        settings.l0_sst_size_bytes = config.auto_commit_buffer_bytes.max(1) as usize;
        settings.compression_codec = if config.use_compression { Some(CompressionCodec::Zstd) } else { None };

        let db = Db::builder(path, config.object_store)
            .with_settings(settings)
            .build()
            .await
            .map_err(crate::error::StorageError::from)?;
        info!(
            database_id = config.database_id,
            cache_bytes = %ByteSize::b(cache_bytes),
            auto_commit_buffer = %ByteSize::b(config.auto_commit_buffer_bytes),
            compression = config.use_compression,
            "obsdb store opened"
        );
        Ok(Self {
            registries: Registries::new(db.clone()),
            indexes: Indexes::new(db),
            gate: WriteGate::new(),
            stream_id_strategy: config.stream_id_strategy,
        })
    }

    /// Runs `body` under the store's single-writer gate (spec §4.6
    /// `executeTransaction`), handing it a [`StoreTransaction`] that can
    /// batch any number of writes — `add`/`put`/`remove`/`delete_stream`/
    /// `clear`/registry mutations — without re-acquiring the gate, so
    /// nesting them inside `body` composes instead of deadlocking against
    /// the permit `execute_transaction` already holds.
    pub async fn execute_transaction<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce(&StoreTransaction<'_>) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self.gate.acquire().await;
        let txn = StoreTransaction { store: self };
        body(&txn).await
    }

    // -- Systems --------------------------------------------------------

    pub async fn get_or_create_system(&self, meta: SystemMeta) -> Result<SystemId, CreateSystemError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.get_or_create_system(meta).await
    }

    pub async fn get_system(&self, id: SystemId) -> Result<SystemMeta, GetSystemError> {
        self.registries.get_system(id).await
    }

    // -- Features of interest --------------------------------------------

    pub async fn get_or_create_foi(&self, meta: FoiMeta) -> Result<FoiId, GetFoiError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.get_or_create_foi(meta).await
    }

    pub async fn get_foi(&self, id: FoiId) -> Result<FoiMeta, GetFoiError> {
        self.registries.get_foi(id).await
    }

    // -- Streams ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_create_stream(
        &self,
        system_id: SystemId,
        output_name: String,
        structure: RecordStructure,
        encoding: RecordEncoding,
        valid_time_start: Instant,
    ) -> Result<StreamId, CreateStreamError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }
            .get_or_create_stream(system_id, output_name, structure, encoding, valid_time_start)
            .await
    }

    pub async fn get_stream(&self, id: StreamId) -> Result<StreamMeta, GetStreamError> {
        self.registries.get_stream(id).await
    }

    pub async fn retire_stream(&self, id: StreamId, end_time: Instant) -> Result<(), GetStreamError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.retire_stream(id, end_time).await
    }

    /// Deletes a stream and every observation it owns (spec §3: "deleting
    /// a stream cascades"). Cascades through the observation indexes
    /// first, then the stream's own registry entry — see
    /// `Registries::delete_stream_registration`'s module docs for why the
    /// order matters.
    pub async fn delete_stream(&self, id: StreamId) -> Result<(), DeleteStreamError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.delete_stream(id).await
    }

    // -- Observations -----------------------------------------------------

    pub async fn add(
        &self,
        stream_id: StreamId,
        observation: Observation,
        encoding: RecordEncoding,
    ) -> Result<ObservationId, AddObservationError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.add(stream_id, observation, encoding).await
    }

    pub async fn put(
        &self,
        stream_id: StreamId,
        observation: Observation,
        encoding: RecordEncoding,
    ) -> Result<ObservationId, PutObservationError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.put(stream_id, observation, encoding).await
    }

    pub async fn remove(&self, id: &ObservationId) -> Result<bool, RemoveObservationError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.remove(id).await
    }

    pub async fn get(&self, id: &ObservationId, encoding: RecordEncoding) -> Result<Option<ObservationRecord>, crate::error::StorageError> {
        self.indexes.get(id, encoding).await
    }

    pub async fn contains_key(&self, id: &ObservationId, encoding: RecordEncoding) -> Result<bool, crate::error::StorageError> {
        Ok(self.get(id, encoding).await?.is_some())
    }

    /// Total observation count across every stream (spec §6
    /// `ObsStore.numRecords`/`.size`, treated as the same count — see
    /// DESIGN.md Open Question 7).
    pub async fn num_records(&self) -> Result<u64, crate::error::StorageError> {
        self.indexes.count_all_records().await
    }

    pub async fn size(&self) -> Result<u64, crate::error::StorageError> {
        self.num_records().await
    }

    // -- Queries ----------------------------------------------------------

    pub async fn select_entries(
        &self,
        filter: ObservationFilter,
    ) -> Result<BoxStream<'static, Result<(ObservationId, ObservationRecord), SelectError>>, SelectError> {
        Planner::new(&self.indexes, &self.registries).select(filter).await
    }

    pub async fn select_keys(
        &self,
        filter: ObservationFilter,
    ) -> Result<BoxStream<'static, Result<ObservationId, SelectError>>, SelectError> {
        let entries = self.select_entries(filter).await?;
        Ok(Box::pin(entries.map(|item| item.map(|(id, _)| id))))
    }

    pub async fn select_results(
        &self,
        filter: ObservationFilter,
    ) -> Result<BoxStream<'static, Result<ObservationRecord, SelectError>>, SelectError> {
        let entries = self.select_entries(filter).await?;
        Ok(Box::pin(entries.map(|item| item.map(|(_, record)| record))))
    }

    pub async fn select_observed_fois(&self, filter: ObservationFilter) -> Result<Vec<FoiId>, SelectError> {
        Planner::new(&self.indexes, &self.registries).select_observed_fois(filter).await
    }

    pub async fn count_matching_entries(&self, filter: ObservationFilter) -> Result<u64, SelectError> {
        Planner::new(&self.indexes, &self.registries).count_matching(filter).await
    }

    pub async fn get_statistics(
        &self,
        request: obsdb_common::StatisticsRequest,
    ) -> Result<Vec<SeriesHistogram>, GetStatisticsError> {
        let planner = Planner::new(&self.indexes, &self.registries);
        stats::get_statistics(&planner, request).await
    }

    /// Drops every stream's observations and registry entries (spec §6
    /// `ObsStore.clear`), leaving systems and FoIs in place. Test-only —
    /// no production caller needs "erase everything but keep the
    /// identity registries", but the spec lists it alongside the other
    /// `ObsStore` operations.
    pub async fn clear(&self) -> Result<(), crate::error::StorageError> {
        let _permit = self.gate.acquire().await;
        StoreTransaction { store: self }.clear().await
    }
}

/// Gate-free mirror of every `Store` write operation (spec §4.6
/// `executeTransaction`: "batch multiple modifications atomically"). Only
/// ever constructed by [`Store::execute_transaction`] and by `Store`'s own
/// gated entry points, which each hold the single permit these methods
/// assume is already held — calling through here never touches
/// `Store::gate`, so a `body` passed to `execute_transaction` can call any
/// number of these without deadlocking against its own held permit.
pub struct StoreTransaction<'a> {
    store: &'a Store,
}

impl StoreTransaction<'_> {
    pub async fn get_or_create_system(&self, meta: SystemMeta) -> Result<SystemId, CreateSystemError> {
        self.store.registries.create_system(meta).await
    }

    pub async fn get_or_create_foi(&self, meta: FoiMeta) -> Result<FoiId, GetFoiError> {
        self.store.registries.create_foi(meta).await.map_err(GetFoiError::Storage)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_create_stream(
        &self,
        system_id: SystemId,
        output_name: String,
        structure: RecordStructure,
        encoding: RecordEncoding,
        valid_time_start: Instant,
    ) -> Result<StreamId, CreateStreamError> {
        self.store
            .registries
            .create_stream(
                system_id,
                output_name,
                structure,
                encoding,
                valid_time_start,
                self.store.stream_id_strategy,
            )
            .await
    }

    pub async fn retire_stream(&self, id: StreamId, end_time: Instant) -> Result<(), GetStreamError> {
        self.store.registries.retire_stream(id, end_time).await
    }

    pub async fn delete_stream(&self, id: StreamId) -> Result<(), DeleteStreamError> {
        self.store.indexes.delete_stream_cascade(id).await?;
        self.store.registries.delete_stream_registration(id).await
    }

    pub async fn add(
        &self,
        stream_id: StreamId,
        observation: Observation,
        encoding: RecordEncoding,
    ) -> Result<ObservationId, AddObservationError> {
        let started = std::time::Instant::now();
        let record = ObservationRecord::from_observation(observation);
        let result = self
            .store
            .indexes
            .add(stream_id, record.foi_id, record.phenomenon_time, record.result_time, encoding, &record)
            .await;
        metrics::observe_write_latency(started.elapsed());
        result
    }

    pub async fn put(
        &self,
        stream_id: StreamId,
        observation: Observation,
        encoding: RecordEncoding,
    ) -> Result<ObservationId, PutObservationError> {
        let started = std::time::Instant::now();
        let record = ObservationRecord::from_observation(observation);
        let result = self
            .store
            .indexes
            .put(stream_id, record.foi_id, record.phenomenon_time, record.result_time, encoding, &record)
            .await;
        metrics::observe_write_latency(started.elapsed());
        result
    }

    pub async fn remove(&self, id: &ObservationId) -> Result<bool, RemoveObservationError> {
        let started = std::time::Instant::now();
        let result = self.store.indexes.remove(id).await;
        metrics::observe_write_latency(started.elapsed());
        result
    }

    pub async fn clear(&self) -> Result<(), crate::error::StorageError> {
        let mut stream = self.store.indexes.all_series();
        let mut stream_ids = std::collections::HashSet::new();
        while let Some(handle) = stream.next().await {
            stream_ids.insert(handle?.stream_id);
        }
        for stream_id in stream_ids {
            self.store.indexes.delete_stream_cascade(stream_id).await?;
        }
        Ok(())
    }
}
