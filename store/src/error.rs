//! Error taxonomy (spec §7): one `thiserror` enum per fallible public
//! operation, composed from a small set of shared leaf errors via
//! `#[from]`/`#[error(transparent)]`.

use std::sync::Arc;

use obsdb_common::{FoiId, StreamId, SystemId};

use crate::keys::DeserializationError;

/// Wraps the underlying engine error plus the key codec's own
/// deserialization failures. Corresponds to spec's `StorageUnavailable` /
/// `Transient`, depending on what kind of `slatedb::Error` is wrapped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("key codec: {0}")]
    Codec(#[from] DeserializationError),
    #[error("engine: {0}")]
    Engine(Arc<slatedb::Error>),
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
}

impl From<slatedb::Error> for StorageError {
    fn from(error: slatedb::Error) -> Self {
        StorageError::Engine(Arc::new(error))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("system `{0}` not found")]
pub struct SystemNotFoundError(pub SystemId);

#[derive(Debug, Clone, thiserror::Error)]
#[error("feature of interest `{0}` not found")]
pub struct FoiNotFoundError(pub FoiId);

/// Spec §7 `UnknownStream`: write of an observation whose `streamId` is
/// absent; rejected before any mutation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("stream `{0}` is unknown")]
pub struct UnknownStreamError(pub StreamId);

#[derive(Debug, Clone, thiserror::Error)]
#[error("stream `{0}` is retired and accepts no writes")]
pub struct StreamRetiredError(pub StreamId);

/// Spec §7 `TooBroad`: planner cap exceeded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("query too broad: resolved {resolved} stream ids, cap is {cap}; refine the filter")]
pub struct TooBroadError {
    pub resolved: usize,
    pub cap: usize,
}

/// Spec §7 `Corruption`: detected mismatch between `SeriesByFoi` and
/// `SeriesByStream`; surfaced, never silently repaired.
#[derive(Debug, Clone, thiserror::Error)]
#[error("index corruption: {0}")]
pub struct CorruptionError(pub String);

/// System registration is create-or-get by `stringId` (spec §4.2), so
/// there is no "already exists" failure mode — only storage failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CreateSystemError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GetSystemError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    NotFound(#[from] SystemNotFoundError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CreateStreamError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    SystemNotFound(#[from] SystemNotFoundError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GetStreamError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    NotFound(#[from] UnknownStreamError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GetFoiError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    NotFound(#[from] FoiNotFoundError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeleteStreamError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    NotFound(#[from] UnknownStreamError),
}

/// Spec §4.3's write path: normalize, resolve-or-create series, insert
/// the record, everything else under the transaction gate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AddObservationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    UnknownStream(#[from] UnknownStreamError),
    #[error(transparent)]
    StreamRetired(#[from] StreamRetiredError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PutObservationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    UnknownStream(#[from] UnknownStreamError),
    #[error(transparent)]
    StreamRetired(#[from] StreamRetiredError),
}

/// Spec §4.3: `remove`/`get` on a malformed opaque id never error; they
/// just behave as "not found". This type has no `InvalidKey` variant for
/// that reason — see module docs on `keys::public_id`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoveObservationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    TooBroad(#[from] TooBroadError),
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GetStatisticsError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    TooBroad(#[from] TooBroadError),
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    /// See DESIGN.md Open Question 2: currently unreachable for
    /// auto-chosen widths, reserved for a future per-series override.
    #[error("aggregateFois=true cannot mix differing bin widths across series")]
    MixedBinWidth,
    /// An explicit bin width this narrow over a query window this wide
    /// would allocate an unreasonable number of bins; refine the filter's
    /// time range or widen `binWidth`.
    #[error("query would produce {requested} histogram bins, cap is {cap}; widen binWidth or narrow the time range")]
    TooManyBins { requested: u64, cap: u64 },
}

impl From<SelectError> for GetStatisticsError {
    fn from(value: SelectError) -> Self {
        match value {
            SelectError::Storage(e) => GetStatisticsError::Storage(e),
            SelectError::TooBroad(e) => GetStatisticsError::TooBroad(e),
            SelectError::Corruption(e) => GetStatisticsError::Corruption(e),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompactionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("storage path escapes configured root: {0}")]
    PathTraversal(String),
}
