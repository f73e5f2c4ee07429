//! The assumed external engine (spec §2 item 2): an ordered byte-key map
//! with get/put/remove, forward range scans, and the order-statistics
//! operations the planner and histogram engine build on (floor, ceiling,
//! rank).
//!
//! `SlateOrderedMap` realizes this trait over `slatedb`, the same way
//! the teacher's `Backend` wraps `slatedb::Db` for its own key-value
//! access (`db_get`/`db_txn_get`/`scan_with_options` in
//! `lite/src/backend/{store,read}.rs`).

use std::ops::Range;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use slatedb::config::{DurabilityLevel, ReadOptions, ScanOptions};
use slatedb::{Db, DbTransaction};

use crate::error::StorageError;

pub type Entry = (Bytes, Bytes);

#[async_trait]
pub trait OrderedMap: Send + Sync {
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StorageError>;

    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StorageError>;

    async fn remove(&self, key: Bytes) -> Result<(), StorageError>;

    /// Forward scan over `[range.start, range.end)`, lazily.
    async fn scan(&self, range: Range<Bytes>) -> Result<BoxStream<'static, Result<Entry, StorageError>>, StorageError>;

    /// First entry with key `>= at_or_after`, within `range`. A single
    /// bounded forward scan, O(log n) amortized under the engine's own
    /// block index.
    async fn ceiling(&self, range: Range<Bytes>, at_or_after: Bytes) -> Result<Option<Entry>, StorageError> {
        let start = if at_or_after > range.start {
            at_or_after
        } else {
            range.start.clone()
        };
        let mut stream = self.scan(start..range.end).await?;
        use futures::StreamExt;
        match stream.next().await {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }

    /// Last entry with key `<= at_or_before`, within `range`. See
    /// DESIGN.md Open Question 5: `slatedb` exposes no predecessor
    /// cursor, so this is a full forward scan of `[range.start,
    /// at_or_before]`, linear in the scanned span rather than O(log n).
    async fn floor(&self, range: Range<Bytes>, at_or_before: Bytes) -> Result<Option<Entry>, StorageError> {
        let end = match bump(&at_or_before) {
            Some(bumped) if bumped < range.end => bumped,
            _ => range.end.clone(),
        };
        use futures::StreamExt;
        let mut stream = self.scan(range.start..end).await?;
        let mut last = None;
        while let Some(entry) = stream.next().await {
            last = Some(entry?);
        }
        Ok(last)
    }

    /// Count of entries with key `<= at_or_before`, within `range` —
    /// zero-based rank of `at_or_before` among `range`'s keys. Same
    /// linear-scan caveat as [`OrderedMap::floor`].
    async fn rank(&self, range: Range<Bytes>, at_or_before: Bytes) -> Result<u64, StorageError> {
        let end = match bump(&at_or_before) {
            Some(bumped) if bumped < range.end => bumped,
            _ => range.end.clone(),
        };
        use futures::StreamExt;
        let mut stream = self.scan(range.start..end).await?;
        let mut count = 0u64;
        while let Some(entry) = stream.next().await {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

/// Smallest byte string strictly greater than `key` that still shares
/// no longer prefix than necessary, i.e. `key` incremented as a
/// big-endian integer. `None` if `key` is all `0xFF` (no successor
/// within a fixed-width domain; callers treat that as "unbounded").
fn bump(key: &Bytes) -> Option<Bytes> {
    let mut buf = BytesMut::from(&key[..]);
    for i in (0..buf.len()).rev() {
        if buf[i] < 0xFF {
            buf[i] += 1;
            buf.truncate(i + 1);
            return Some(buf.freeze());
        }
    }
    None
}

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

/// `OrderedMap` over a single `slatedb::Db`, used for the non-transactional
/// registry reads/writes (systems, FoIs, streams, counters). Observation
/// index writes that must be atomic across `ObsRecords`/`SeriesByStream`/
/// `SeriesByFoi` go through `SlateTransaction` instead (see `txn.rs`).
#[derive(Clone)]
pub struct SlateOrderedMap {
    db: Db,
}

impl SlateOrderedMap {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

#[async_trait]
impl OrderedMap for SlateOrderedMap {
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StorageError> {
        Ok(self.db.get_with_options(key, &GET_OPTS).await?)
    }

    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StorageError> {
        self.db.put(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: Bytes) -> Result<(), StorageError> {
        self.db.delete(key).await?;
        Ok(())
    }

    async fn scan(&self, range: Range<Bytes>) -> Result<BoxStream<'static, Result<Entry, StorageError>>, StorageError> {
        let db = self.db.clone();
        let stream = try_stream! {
            let mut iter = db.scan_with_options(range, &SCAN_OPTS).await?;
            while let Some(kv) = iter.next().await? {
                yield (kv.key, kv.value);
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Read/write view over one open `DbTransaction`, used by the observation
/// write path (`indexes.rs`) to update all three correlated indexes
/// atomically. Reads observe the transaction's own uncommitted writes
/// (`DurabilityLevel::Memory`), matching the teacher's `db_txn_get`.
pub struct SlateTransactionMap<'txn> {
    txn: &'txn DbTransaction,
}

impl<'txn> SlateTransactionMap<'txn> {
    pub fn new(txn: &'txn DbTransaction) -> Self {
        Self { txn }
    }

    pub async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StorageError> {
        Ok(self.txn.get_with_options(key, &GET_OPTS).await?)
    }

    /// Buffered in the open transaction; not durable until the caller
    /// commits it (teacher's `txn.put(...)?` pattern in `basins.rs` /
    /// `streams.rs` — writes inside a transaction are synchronous).
    pub fn put(&self, key: Bytes, value: Bytes) -> Result<(), StorageError> {
        self.txn.put(key, value)?;
        Ok(())
    }

    pub fn remove(&self, key: Bytes) -> Result<(), StorageError> {
        self.txn.delete(key)?;
        Ok(())
    }

    pub async fn scan(&self, range: Range<Bytes>) -> Result<Vec<Entry>, StorageError> {
        let mut iter = self.txn.scan_with_options(range, &SCAN_OPTS).await?;
        let mut out = Vec::new();
        while let Some(kv) = iter.next().await? {
            out.push((kv.key, kv.value));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slatedb::object_store::memory::InMemory;

    use super::*;

    async fn test_map() -> SlateOrderedMap {
        let object_store = Arc::new(InMemory::new());
        let db = Db::builder("/test", object_store)
            .build()
            .await
            .expect("in-memory db always opens");
        SlateOrderedMap::new(db)
    }

    #[tokio::test]
    async fn put_then_get_returns_the_value() {
        let map = test_map().await;
        map.put(Bytes::from_static(b"k1"), Bytes::from_static(b"v1"))
            .await
            .unwrap();
        assert_eq!(
            map.get(Bytes::from_static(b"k1")).await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
    }

    #[tokio::test]
    async fn remove_makes_a_key_absent() {
        let map = test_map().await;
        map.put(Bytes::from_static(b"k1"), Bytes::from_static(b"v1"))
            .await
            .unwrap();
        map.remove(Bytes::from_static(b"k1")).await.unwrap();
        assert_eq!(map.get(Bytes::from_static(b"k1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ceiling_finds_the_first_key_at_or_after() {
        let map = test_map().await;
        for k in [b"a".as_slice(), b"c".as_slice(), b"e".as_slice()] {
            map.put(Bytes::copy_from_slice(k), Bytes::new()).await.unwrap();
        }
        let range = Bytes::from_static(b"\x00")..Bytes::from_static(b"\xff");
        let found = map.ceiling(range, Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(found.map(|(k, _)| k), Some(Bytes::from_static(b"c")));
    }

    #[tokio::test]
    async fn floor_finds_the_last_key_at_or_before() {
        let map = test_map().await;
        for k in [b"a".as_slice(), b"c".as_slice(), b"e".as_slice()] {
            map.put(Bytes::copy_from_slice(k), Bytes::new()).await.unwrap();
        }
        let range = Bytes::from_static(b"\x00")..Bytes::from_static(b"\xff");
        let found = map.floor(range, Bytes::from_static(b"d")).await.unwrap();
        assert_eq!(found.map(|(k, _)| k), Some(Bytes::from_static(b"c")));
    }

    #[tokio::test]
    async fn rank_counts_entries_at_or_before() {
        let map = test_map().await;
        for k in [b"a".as_slice(), b"c".as_slice(), b"e".as_slice()] {
            map.put(Bytes::copy_from_slice(k), Bytes::new()).await.unwrap();
        }
        let range = Bytes::from_static(b"\x00")..Bytes::from_static(b"\xff");
        assert_eq!(map.rank(range, Bytes::from_static(b"d")).await.unwrap(), 2);
    }
}
