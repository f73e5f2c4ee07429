//! Feature-of-interest registry: create-by-`stringId` (idempotent),
//! sequential `FoiId` allocation. Geometry is stored opaquely as WKT
//! (`FoiMeta::geometry_wkt`) — geometric indexing beyond this identifier
//! lookup is out of scope (spec §1).

use obsdb_common::FoiId;

use crate::error::{FoiNotFoundError, GetFoiError, StorageError};
use crate::keys::registry_keys::{self, CounterKind, FoiMeta};
use crate::ordered_map::SlateTransactionMap;

use super::{Registries, WRITE_OPTS, next_id};

impl Registries {
    pub async fn create_foi(&self, meta: FoiMeta) -> Result<FoiId, StorageError> {
        let txn = self.begin().await?;
        let map = SlateTransactionMap::new(&txn);

        let string_index_key = registry_keys::ser_foi_string_index_key(&meta.string_id);
        if let Some(existing) = map.get(string_index_key.clone()).await? {
            return Ok(registry_keys::deser_foi_string_index_value(existing)?);
        }

        let id = FoiId::new(next_id(&map, CounterKind::Foi).await?);
        map.put(
            registry_keys::ser_foi_meta_key(id),
            registry_keys::ser_foi_meta_value(&meta),
        )?;
        map.put(string_index_key, registry_keys::ser_foi_string_index_value(id))?;

        txn.commit_with_options(&WRITE_OPTS).await?;
        Ok(id)
    }

    pub async fn get_foi(&self, id: FoiId) -> Result<FoiMeta, GetFoiError> {
        let bytes = self.db.get(registry_keys::ser_foi_meta_key(id)).await.map_err(StorageError::from)?;
        let Some(bytes) = bytes else {
            return Err(FoiNotFoundError(id).into());
        };
        Ok(registry_keys::deser_foi_meta_value(bytes).map_err(StorageError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slatedb::Db;
    use slatedb::object_store::memory::InMemory;

    use super::*;

    async fn test_registries() -> Registries {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store).build().await.unwrap();
        Registries::new(db)
    }

    fn sample_meta(string_id: &str) -> FoiMeta {
        FoiMeta {
            string_id: string_id.to_string(),
            geometry_wkt: Some("POINT(0 0)".to_string()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_metadata() {
        let registries = test_registries().await;
        let id = registries.create_foi(sample_meta("foi-1")).await.unwrap();
        let meta = registries.get_foi(id).await.unwrap();
        assert_eq!(meta.string_id, "foi-1");
    }

    #[tokio::test]
    async fn create_is_idempotent_on_string_id() {
        let registries = test_registries().await;
        let first = registries.create_foi(sample_meta("foi-1")).await.unwrap();
        let second = registries.create_foi(sample_meta("foi-1")).await.unwrap();
        assert_eq!(first, second);
    }
}
