//! System/FoI/stream registries (spec §4.2): create-or-get, valid-time
//! versioning, cascading stream deletion. Grounded on the teacher's
//! `basins.rs`/`streams.rs` shape — `db.begin(IsolationLevel::
//! SerializableSnapshot)`, read-then-write under one transaction,
//! `commit_with_options(&WRITE_OPTS)`.

pub mod fois;
pub mod streams;
pub mod systems;

use slatedb::config::WriteOptions;
use slatedb::{Db, DbTransaction, IsolationLevel};

use crate::error::StorageError;
use crate::keys::registry_keys::{self, CounterKind};
use crate::ordered_map::SlateTransactionMap;

pub(crate) const WRITE_OPTS: WriteOptions = WriteOptions {
    await_durable: true,
};

/// Holds the shared `slatedb::Db` handle the system/FoI/stream registries
/// read and write (see DESIGN.md Open Question 4: one engine instance,
/// partitioned by key type, standing in for the spec's three named
/// sub-stores).
#[derive(Clone)]
pub struct Registries {
    db: Db,
}

impl Registries {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub(crate) async fn begin(&self) -> Result<DbTransaction, StorageError> {
        Ok(self.db.begin(IsolationLevel::SerializableSnapshot).await?)
    }
}

/// Allocates the next sequential id for `kind`, persisted as a counter
/// key bumped in the same transaction as the registry write that consumes
/// it. Substitutes for rescanning the index for `max(id)+1` on every
/// write (DESIGN.md Open Question 6) — `slatedb`'s forward-only scan
/// makes that rescan the only alternative, and it would be O(n) per
/// write.
pub(crate) async fn next_id(
    map: &SlateTransactionMap<'_>,
    kind: CounterKind,
) -> Result<u64, StorageError> {
    let key = registry_keys::ser_counter_key(kind);
    let current = match map.get(key.clone()).await? {
        Some(bytes) => registry_keys::deser_counter_value(bytes)?,
        None => 0,
    };
    let next = current + 1;
    map.put(key, registry_keys::ser_counter_value(next))?;
    Ok(next)
}
