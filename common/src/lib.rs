//! Wire-independent domain types shared by the observation store engine
//! and any future embedder: instants/durations, the dynamically-typed
//! result value, filter/query vocabulary, and statistics types.

pub mod filter;
pub mod ids;
pub mod record;
pub mod stats;
pub mod time;

pub use filter::{BinWidth, ObservationFilter, StatisticsRequest, TemporalFilter, ValuePredicate};
pub use ids::{FoiId, ObservationId, SeriesId, StreamId, SystemId};
pub use record::{EncodingError, Observation, ObservationRecord, RecordEncoding, ResultValue, Scalar};
pub use stats::{HistogramBin, ObsStats, BIN_WIDTH_LADDER_SECS};
pub use time::{Duration, Instant, InstantDecodeError};
