//! Federation / routing shim (spec §4.7): the same read API over an
//! ordered set of backing stores, each narrowed to the stream/foi ids a
//! dispatch map says live there, fanned out and merged by the same
//! k-way merge the planner uses intra-store (`merge.rs`). Writes are
//! out of scope here — a caller writes directly to whichever backing
//! `Store` owns the stream.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use obsdb_common::{FoiId, ObservationFilter, ObservationId, ObservationRecord, StreamId};

use crate::error::SelectError;
use crate::merge::{MergeItem, merge_by_phenomenon_time};
use crate::store::Store;

/// One member of the federation: the store itself, plus the dispatch
/// map's record of which streams/fois it owns. An empty set on either
/// axis means "this store isn't restricted on that axis" — every filter
/// reaches it unnarrowed on that dimension, same convention as
/// `ObservationFilter` itself.
pub struct BackingStore {
    pub store: Arc<Store>,
    pub streams: Vec<StreamId>,
    pub fois: Vec<FoiId>,
}

pub struct Federation {
    backing: Vec<BackingStore>,
}

impl Federation {
    pub fn new(backing: Vec<BackingStore>) -> Self {
        Self { backing }
    }

    /// Narrows `filter` to `backing`'s local ids, or `None` if the
    /// narrowed query could not possibly match anything there (spec
    /// §4.7 "the filter narrowed to stream/foi ids local to that
    /// store").
    fn narrow(filter: &ObservationFilter, backing: &BackingStore) -> Option<ObservationFilter> {
        let mut narrowed = filter.clone();

        if !backing.streams.is_empty() {
            let allowed: HashSet<StreamId> = backing.streams.iter().copied().collect();
            narrowed.streams = if filter.streams.is_empty() {
                backing.streams.clone()
            } else {
                filter.streams.iter().copied().filter(|s| allowed.contains(s)).collect()
            };
            if narrowed.streams.is_empty() {
                return None;
            }
        }

        if !backing.fois.is_empty() {
            let allowed: HashSet<FoiId> = backing.fois.iter().copied().collect();
            narrowed.fois = if filter.fois.is_empty() {
                backing.fois.clone()
            } else {
                filter.fois.iter().copied().filter(|f| allowed.contains(f)).collect()
            };
            if narrowed.fois.is_empty() {
                return None;
            }
        }

        Some(narrowed)
    }

    /// Dispatches `filter` to every backing store it could match, merges
    /// the per-store results by phenomenon time (spec §4.7). Each
    /// backing store's own records have no stream id left once they
    /// reach this layer (`ObservationRecord` doesn't carry one — see
    /// `stats.rs`'s module docs for the same limitation), so the merge's
    /// tie-break uses only `foiId`; a constant placeholder stands in for
    /// `streamId` and never actually discriminates two items.
    pub async fn select(
        &self,
        filter: ObservationFilter,
    ) -> Result<BoxStream<'static, Result<(ObservationId, ObservationRecord), SelectError>>, SelectError> {
        let mut sources = Vec::with_capacity(self.backing.len());
        for backing in &self.backing {
            let Some(local_filter) = Self::narrow(&filter, backing) else {
                continue;
            };
            let inner = backing.store.select_entries(local_filter).await?;
            sources.push(tag_with_merge_keys(inner));
        }

        let merged = merge_by_phenomenon_time(sources);
        let stream = try_stream! {
            let mut merged = merged;
            while let Some(item) = merged.next().await {
                yield item?.payload;
            }
        };
        Ok(Box::pin(stream))
    }
}

const PLACEHOLDER_STREAM_ID: StreamId = StreamId::new(0);

fn tag_with_merge_keys(
    inner: BoxStream<'static, Result<(ObservationId, ObservationRecord), SelectError>>,
) -> BoxStream<'static, Result<MergeItem<(ObservationId, ObservationRecord)>, SelectError>> {
    let stream = try_stream! {
        let mut inner = inner;
        while let Some(item) = inner.next().await {
            let (id, record) = item?;
            yield MergeItem {
                phenomenon_time: record.phenomenon_time,
                stream_id: PLACEHOLDER_STREAM_ID,
                foi_id: record.foi_id,
                payload: (id, record),
            };
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use obsdb_common::{Instant, Observation, RecordEncoding, Scalar, ResultValue};
    use slatedb::object_store::memory::InMemory;

    use crate::config::StartConfig;
    use crate::keys::registry_keys::{FieldDescriptor, FoiMeta, RecordStructure, SystemMeta};
    use crate::registry::streams::StreamIdStrategy;

    use super::*;

    fn test_config() -> StartConfig {
        StartConfig {
            storage_path: "/fed-test".into(),
            allowed_root: "/".into(),
            memory_cache_kb: 0,
            auto_commit_buffer_bytes: 0,
            use_compression: false,
            stream_id_strategy: StreamIdStrategy::Sequential,
            database_id: 1,
            index_obs_location: false,
            object_store: Arc::new(InMemory::new()),
        }
    }

    async fn seeded_store(system_name: &str, output: &str, foi_string_id: &str) -> (Arc<Store>, StreamId, FoiId) {
        let store = Arc::new(Store::start(test_config()).await.unwrap());
        let system_id = store
            .get_or_create_system(SystemMeta {
                string_id: system_name.to_string(),
                name: system_name.to_string(),
                description: None,
                sensorml_description: None,
                parent_group_id: None,
                valid_time_start: Instant::at(0, 0),
                outputs: vec![],
                control_inputs: vec![],
            })
            .await
            .unwrap();
        let stream_id = store
            .get_or_create_stream(
                system_id,
                output.to_string(),
                RecordStructure {
                    fields: vec![FieldDescriptor {
                        name: "value".to_string(),
                        observable_uri: None,
                        unit: None,
                    }],
                },
                RecordEncoding::Json,
                Instant::at(0, 0),
            )
            .await
            .unwrap();
        let foi_id = store
            .get_or_create_foi(FoiMeta {
                string_id: foi_string_id.to_string(),
                geometry_wkt: None,
                metadata: None,
            })
            .await
            .unwrap();
        (store, stream_id, foi_id)
    }

    #[tokio::test]
    async fn select_merges_across_backing_stores_in_time_order() {
        let (store_a, stream_a, foi_a) = seeded_store("sys-a", "out-a", "foi-a").await;
        let (store_b, stream_b, foi_b) = seeded_store("sys-b", "out-b", "foi-b").await;

        store_a
            .add(
                stream_a,
                Observation {
                    foi_id: foi_a,
                    phenomenon_time: Instant::at(10, 0),
                    result_time: Instant::at(10, 0),
                    result: ResultValue::Scalar(Scalar::Int(1)),
                },
                RecordEncoding::Json,
            )
            .await
            .unwrap();
        store_b
            .add(
                stream_b,
                Observation {
                    foi_id: foi_b,
                    phenomenon_time: Instant::at(5, 0),
                    result_time: Instant::at(5, 0),
                    result: ResultValue::Scalar(Scalar::Int(2)),
                },
                RecordEncoding::Json,
            )
            .await
            .unwrap();

        let federation = Federation::new(vec![
            BackingStore { store: store_a, streams: vec![stream_a], fois: vec![] },
            BackingStore { store: store_b, streams: vec![stream_b], fois: vec![] },
        ]);

        let mut stream = federation.select(ObservationFilter::new()).await.unwrap();
        let mut results = Vec::new();
        while let Some(item) = stream.next().await {
            let (_, record) = item.unwrap();
            results.push(record.result.as_f64());
        }
        assert_eq!(results, vec![Some(2.0), Some(1.0)]);
    }

    #[tokio::test]
    async fn explicit_stream_filter_skips_unrelated_backing_stores() {
        let (store_a, stream_a, foi_a) = seeded_store("sys-a", "out-a", "foi-a").await;
        let (store_b, stream_b, _) = seeded_store("sys-b", "out-b", "foi-b").await;

        store_a
            .add(
                stream_a,
                Observation {
                    foi_id: foi_a,
                    phenomenon_time: Instant::at(1, 0),
                    result_time: Instant::at(1, 0),
                    result: ResultValue::Scalar(Scalar::Int(7)),
                },
                RecordEncoding::Json,
            )
            .await
            .unwrap();

        let federation = Federation::new(vec![
            BackingStore { store: store_a, streams: vec![stream_a], fois: vec![] },
            BackingStore { store: store_b, streams: vec![stream_b], fois: vec![] },
        ]);

        let filter = ObservationFilter::new().with_stream(stream_a);
        let mut stream = federation.select(filter).await.unwrap();
        let mut count = 0;
        while let Some(item) = stream.next().await {
            item.unwrap();
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
