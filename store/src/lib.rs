//! Observation storage engine (spec §2): a paged ordered-map-backed
//! store of time-series observations keyed by stream and feature of
//! interest, with a query planner, histogram engine, and explicit
//! compaction. Grounded throughout on the teacher's `slatedb`-backed
//! `Backend` (`lite/src/backend/`).

pub mod compaction;
pub mod config;
pub mod error;
pub mod federation;
pub mod indexes;
pub mod keys;
pub mod merge;
pub mod metrics;
pub mod ordered_map;
pub mod planner;
pub mod registry;
pub mod stats;
pub mod store;
pub mod txn;

pub use compaction::CompactionReport;
pub use config::StartConfig;
pub use error::{
    AddObservationError, CompactionError, CorruptionError, CreateStreamError, CreateSystemError,
    DeleteStreamError, FoiNotFoundError, GetFoiError, GetStatisticsError, GetStreamError,
    GetSystemError, PutObservationError, RemoveObservationError, SelectError, StartError,
    StorageError, StreamRetiredError, SystemNotFoundError, TooBroadError, UnknownStreamError,
};
pub use federation::{BackingStore, Federation};
pub use planner::Planner;
pub use registry::streams::StreamIdStrategy;
pub use stats::SeriesHistogram;
pub use store::{Store, StoreTransaction};
