//! Stable k-way merge by phenomenon time (spec §4.4 "Merge"): concatenates
//! the planner's per-series lazy streams into one globally time-ordered
//! stream. Each source stream is itself ascending in phenomenon time (a
//! per-series scan, spec §3 "ordered iteration... strictly increasing by
//! phenomenonTime"), so a classic heap-based merge suffices; ties break
//! by `(streamId, foiId)` (spec §4.4).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use obsdb_common::{FoiId, Instant, StreamId};

/// One item flowing through the merge: the sort key (`phenomenon_time`,
/// `stream_id`, `foi_id`) plus whatever payload the caller is merging
/// (full records, bare keys, or result values — the three `select*`
/// variants all merge the same shape with a different payload).
#[derive(Debug, Clone)]
pub struct MergeItem<T> {
    pub phenomenon_time: Instant,
    pub stream_id: StreamId,
    pub foi_id: FoiId,
    pub payload: T,
}

type SortKey = (Instant, u64, u64, usize);

/// Merges `sources` into one stream ordered by `phenomenon_time`, ties
/// broken by `(streamId, foiId)`, stable across equal keys from the same
/// source since a source never reorders its own items. Generic over the
/// error type so both the intra-store planner (`SelectError` narrowed to
/// `StorageError` fan-out) and the federation shim (whole `SelectError`
/// per backing store) share one merge implementation (spec §4.7 "the
/// resulting lazy streams are merged by the same k-way merge used
/// intra-store").
pub fn merge_by_phenomenon_time<T: Send + 'static, E: Send + 'static>(
    mut sources: Vec<BoxStream<'static, Result<MergeItem<T>, E>>>,
) -> BoxStream<'static, Result<MergeItem<T>, E>> {
    let stream = try_stream! {
        let mut heap: BinaryHeap<Reverse<SortKey>> = BinaryHeap::new();
        let mut pending: Vec<Option<MergeItem<T>>> = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter_mut().enumerate() {
            match source.next().await {
                Some(Ok(item)) => {
                    heap.push(Reverse((item.phenomenon_time, item.stream_id.get(), item.foi_id.get(), i)));
                    pending.push(Some(item));
                }
                Some(Err(e)) => Err(e)?,
                None => pending.push(None),
            }
        }
        while let Some(Reverse((_, _, _, i))) = heap.pop() {
            let item = pending[i].take().expect("heap entry always has a pending item");
            yield item;
            match sources[i].next().await {
                Some(Ok(next_item)) => {
                    heap.push(Reverse((
                        next_item.phenomenon_time,
                        next_item.stream_id.get(),
                        next_item.foi_id.get(),
                        i,
                    )));
                    pending[i] = Some(next_item);
                }
                Some(Err(e)) => Err(e)?,
                None => {}
            }
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use crate::error::StorageError;

    use super::*;

    fn item(secs: i64, stream_id: u64, foi_id: u64, payload: i32) -> Result<MergeItem<i32>, StorageError> {
        Ok(MergeItem {
            phenomenon_time: Instant::at(secs, 0),
            stream_id: StreamId::new(stream_id),
            foi_id: FoiId::new(foi_id),
            payload,
        })
    }

    #[tokio::test]
    async fn merges_two_ascending_sources_in_time_order() {
        let a = Box::pin(stream::iter(vec![item(0, 1, 1, 10), item(2, 1, 1, 12), item(4, 1, 1, 14)]));
        let b = Box::pin(stream::iter(vec![item(1, 2, 1, 11), item(3, 2, 1, 13)]));
        let merged: Vec<_> = merge_by_phenomenon_time(vec![a, b])
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|r| r.unwrap().payload)
            .collect();
        assert_eq!(merged, vec![10, 11, 12, 13, 14]);
    }

    #[tokio::test]
    async fn ties_break_by_stream_then_foi() {
        let a = Box::pin(stream::iter(vec![item(0, 2, 5, 200)]));
        let b = Box::pin(stream::iter(vec![item(0, 1, 5, 100)]));
        let merged: Vec<_> = merge_by_phenomenon_time(vec![a, b])
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|r| r.unwrap().payload)
            .collect();
        assert_eq!(merged, vec![100, 200]);
    }

    #[tokio::test]
    async fn empty_sources_merge_to_empty() {
        let merged: Vec<Result<MergeItem<i32>, StorageError>> = merge_by_phenomenon_time(Vec::new()).collect().await;
        assert!(merged.is_empty());
    }
}
