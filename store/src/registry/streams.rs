//! Stream registry: create-or-get by `(systemId, outputName,
//! validTimeStart)` (spec §8 invariant 8 — idempotent registration),
//! two `StreamId` allocation strategies (spec §4.2), retire/delete.

use obsdb_common::{Instant, RecordEncoding, StreamId, SystemId};

use crate::error::{
    CreateStreamError, DeleteStreamError, GetStreamError, SystemNotFoundError, UnknownStreamError,
};
use crate::keys::registry_keys::{self, CounterKind, RecordStructure, StreamMeta, StreamState};
use crate::ordered_map::SlateTransactionMap;

use super::{Registries, WRITE_OPTS, next_id};

/// How a newly registered stream is assigned its internal id (spec §4.2):
/// either a dense sequential counter, or a deterministic hash of its
/// natural key so the same `(system, output, validTimeStart)` always maps
/// to the same id even across independently-initialized stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamIdStrategy {
    Sequential,
    DeterministicHash,
}

fn millis_of(instant: Instant) -> i64 {
    match instant {
        Instant::NegInfinity => i64::MIN,
        Instant::PosInfinity => i64::MAX,
        Instant::At { seconds, nanos } => seconds
            .saturating_mul(1000)
            .saturating_add((nanos / 1_000_000) as i64),
    }
}

/// Truncates a blake3 digest of the stream's natural key to 48 bits,
/// matching the teacher's `StreamId::new` (full 32-byte blake3 hash) but
/// narrowed to fit this engine's 64-bit id space; the high 16 bits are
/// reserved as probe-perturbation salt on collision.
fn hash_candidate(system_id: SystemId, output_name: &str, valid_time_start_millis: i64, salt: u16) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&system_id.get().to_be_bytes());
    hasher.update(&[0]);
    hasher.update(output_name.as_bytes());
    hasher.update(&[0]);
    hasher.update(&valid_time_start_millis.to_be_bytes());
    hasher.update(&salt.to_be_bytes());
    let digest = hasher.finalize();
    let mut buf = [0u8; 8];
    buf[2..8].copy_from_slice(&digest.as_bytes()[0..6]);
    u64::from_be_bytes(buf)
}

impl Registries {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_stream(
        &self,
        system_id: SystemId,
        output_name: String,
        structure: RecordStructure,
        encoding: RecordEncoding,
        valid_time_start: Instant,
        strategy: StreamIdStrategy,
    ) -> Result<StreamId, CreateStreamError> {
        let txn = self.begin().await?;
        let map = SlateTransactionMap::new(&txn);

        if map.get(registry_keys::ser_system_meta_key(system_id)).await?.is_none() {
            return Err(SystemNotFoundError(system_id).into());
        }

        let valid_time_start_millis = millis_of(valid_time_start);
        let lookup_key =
            registry_keys::ser_stream_lookup_key(system_id, &output_name, valid_time_start_millis);
        if let Some(existing) = map.get(lookup_key.clone()).await? {
            return Ok(registry_keys::deser_stream_lookup_value(existing)?);
        }

        let id = match strategy {
            StreamIdStrategy::Sequential => StreamId::new(next_id(&map, CounterKind::Stream).await?),
            StreamIdStrategy::DeterministicHash => {
                let mut salt = 0u16;
                loop {
                    let candidate = StreamId::new(hash_candidate(
                        system_id,
                        &output_name,
                        valid_time_start_millis,
                        salt,
                    ));
                    if map.get(registry_keys::ser_stream_meta_key(candidate)).await?.is_none() {
                        break candidate;
                    }
                    salt = salt.checked_add(1).expect("exhausted 65536 collision probes");
                }
            }
        };

        let meta = StreamMeta {
            system_id,
            output_name,
            structure,
            encoding,
            valid_time_start,
            valid_time_end: None,
            state: StreamState::Live,
        };
        map.put(registry_keys::ser_stream_meta_key(id), registry_keys::ser_stream_meta_value(&meta))?;
        map.put(lookup_key, registry_keys::ser_stream_lookup_value(id))?;

        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(id)
    }

    pub async fn get_stream(&self, id: StreamId) -> Result<StreamMeta, GetStreamError> {
        let bytes = self
            .db
            .get(registry_keys::ser_stream_meta_key(id))
            .await
            .map_err(crate::error::StorageError::from)?;
        let Some(bytes) = bytes else {
            return Err(UnknownStreamError(id).into());
        };
        Ok(registry_keys::deser_stream_meta_value(bytes).map_err(crate::error::StorageError::from)?)
    }

    /// Marks a stream retired as of `end_time`: no further writes are
    /// accepted (spec §4.3 `StreamRetired`), but existing observations
    /// remain readable.
    pub async fn retire_stream(&self, id: StreamId, end_time: Instant) -> Result<(), GetStreamError> {
        let txn = self.begin().await?;
        let map = SlateTransactionMap::new(&txn);
        let key = registry_keys::ser_stream_meta_key(id);
        let Some(bytes) = map.get(key.clone()).await? else {
            return Err(UnknownStreamError(id).into());
        };
        let mut meta = registry_keys::deser_stream_meta_value(bytes).map_err(crate::error::StorageError::from)?;
        meta.state = StreamState::Retired;
        meta.valid_time_end = Some(end_time);
        map.put(key, registry_keys::ser_stream_meta_value(&meta))?;
        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(())
    }

    /// Removes the stream's registry entries only. Callers are
    /// responsible for first removing the stream's observation indexes
    /// (`Store::delete_stream` cascades through `indexes::delete_series`
    /// before calling this) — the registry itself has no visibility into
    /// the observation indexes, which may live behind a different
    /// `Registries`/`Indexes` split in an embedding deployment.
    pub async fn delete_stream_registration(&self, id: StreamId) -> Result<(), DeleteStreamError> {
        let txn = self.begin().await?;
        let map = SlateTransactionMap::new(&txn);
        let key = registry_keys::ser_stream_meta_key(id);
        let Some(bytes) = map.get(key.clone()).await? else {
            return Err(UnknownStreamError(id).into());
        };
        let meta = registry_keys::deser_stream_meta_value(bytes).map_err(crate::error::StorageError::from)?;
        let lookup_key = registry_keys::ser_stream_lookup_key(
            meta.system_id,
            &meta.output_name,
            millis_of(meta.valid_time_start),
        );
        map.remove(key)?;
        map.remove(lookup_key)?;
        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slatedb::Db;
    use slatedb::object_store::memory::InMemory;

    use crate::keys::registry_keys::{FieldDescriptor, SystemMeta};

    use super::*;

    async fn test_registries_with_system() -> (Registries, SystemId) {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store).build().await.unwrap();
        let registries = Registries::new(db);
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
        (registries, system_id)
    }

    fn sample_structure() -> RecordStructure {
        RecordStructure {
            fields: vec![FieldDescriptor {
                name: "value".to_string(),
                observable_uri: None,
                unit: None,
            }],
        }
    }

    #[tokio::test]
    async fn sequential_strategy_allocates_distinct_ids() {
        let (registries, system_id) = test_registries_with_system().await;
        let a = registries
            .create_stream(
                system_id,
                "temperature".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::Sequential,
            )
            .await
            .unwrap();
        let b = registries
            .create_stream(
                system_id,
                "humidity".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::Sequential,
            )
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_is_idempotent_on_natural_key() {
        let (registries, system_id) = test_registries_with_system().await;
        let first = registries
            .create_stream(
                system_id,
                "temperature".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::DeterministicHash,
            )
            .await
            .unwrap();
        let second = registries
            .create_stream(
                system_id,
                "temperature".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::DeterministicHash,
            )
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn create_on_unknown_system_fails() {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store).build().await.unwrap();
        let registries = Registries::new(db);
        let result = registries
            .create_stream(
                SystemId::new(999),
                "temperature".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::Sequential,
            )
            .await;
        assert!(matches!(result, Err(CreateStreamError::SystemNotFound(_))));
    }

    #[tokio::test]
    async fn retiring_a_stream_rejects_further_lookups_as_live() {
        let (registries, system_id) = test_registries_with_system().await;
        let stream_id = registries
            .create_stream(
                system_id,
                "temperature".to_string(),
                sample_structure(),
                RecordEncoding::Json,
                Instant::at(0, 0),
                StreamIdStrategy::Sequential,
            )
            .await
            .unwrap();
        registries.retire_stream(stream_id, Instant::at(1000, 0)).await.unwrap();
        let meta = registries.get_stream(stream_id).await.unwrap();
        assert_eq!(meta.state, StreamState::Retired);
    }
}
