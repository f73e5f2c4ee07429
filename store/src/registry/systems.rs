//! System registry: create-by-`stringId` (idempotent on a matching
//! `stringId`), sequential `SystemId` allocation.

use obsdb_common::SystemId;

use crate::error::{CreateSystemError, GetSystemError, SystemNotFoundError};
use crate::keys::registry_keys::{self, CounterKind, SystemMeta};
use crate::ordered_map::SlateTransactionMap;

use super::{Registries, WRITE_OPTS, next_id};

impl Registries {
    /// Registers a new system. Returns the existing id without error if a
    /// system with the same `stringId` is already registered (spec §4.2
    /// create-or-get semantics, mirrored from the teacher's basin/stream
    /// `CreateOnly` idempotency check).
    pub async fn create_system(&self, meta: SystemMeta) -> Result<SystemId, CreateSystemError> {
        let txn = self.begin().await?;
        let map = SlateTransactionMap::new(&txn);

        let string_index_key = registry_keys::ser_system_string_index_key(&meta.string_id);
        if let Some(existing) = map.get(string_index_key.clone()).await? {
            let id = registry_keys::deser_system_string_index_value(existing)
                .map_err(crate::error::StorageError::from)?;
            return Ok(id);
        }

        let id = SystemId::new(next_id(&map, CounterKind::System).await?);
        map.put(
            registry_keys::ser_system_meta_key(id),
            registry_keys::ser_system_meta_value(&meta),
        )?;
        map.put(string_index_key, registry_keys::ser_system_string_index_value(id))?;

        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(id)
    }

    pub async fn get_system(&self, id: SystemId) -> Result<SystemMeta, GetSystemError> {
        let bytes = self
            .db
            .get(registry_keys::ser_system_meta_key(id))
            .await
            .map_err(crate::error::StorageError::from)?;
        let Some(bytes) = bytes else {
            return Err(SystemNotFoundError(id).into());
        };
        Ok(registry_keys::deser_system_meta_value(bytes).map_err(crate::error::StorageError::from)?)
    }

    pub async fn get_system_by_string_id(
        &self,
        string_id: &str,
    ) -> Result<Option<(SystemId, SystemMeta)>, crate::error::StorageError> {
        let Some(value) = self
            .db
            .get(registry_keys::ser_system_string_index_key(string_id))
            .await?
        else {
            return Ok(None);
        };
        let id = registry_keys::deser_system_string_index_value(value)?;
        let meta = self.get_system(id).await.map_err(|e| match e {
            GetSystemError::Storage(e) => e,
            GetSystemError::NotFound(_) => unreachable!("string index points at a live SystemMeta"),
        })?;
        Ok(Some((id, meta)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use obsdb_common::Instant;
    use slatedb::Db;
    use slatedb::object_store::memory::InMemory;

    use super::*;

    async fn test_registries() -> Registries {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store).build().await.unwrap();
        Registries::new(db)
    }

    fn sample_meta(string_id: &str) -> SystemMeta {
        SystemMeta {
            string_id: string_id.to_string(),
            name: "weather station".to_string(),
            description: None,
            sensorml_description: None,
            parent_group_id: None,
            valid_time_start: Instant::at(0, 0),
            outputs: vec!["temperature".to_string()],
            control_inputs: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_metadata() {
        let registries = test_registries().await;
        let id = registries.create_system(sample_meta("sys-1")).await.unwrap();
        let meta = registries.get_system(id).await.unwrap();
        assert_eq!(meta.string_id, "sys-1");
    }

    #[tokio::test]
    async fn create_is_idempotent_on_string_id() {
        let registries = test_registries().await;
        let first = registries.create_system(sample_meta("sys-1")).await.unwrap();
        let second = registries.create_system(sample_meta("sys-1")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_unknown_system_is_not_found() {
        let registries = test_registries().await;
        let err = registries.get_system(SystemId::new(999)).await.unwrap_err();
        assert!(matches!(err, GetSystemError::NotFound(_)));
    }
}
