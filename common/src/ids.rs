//! Small `Copy` newtypes over `u64` for the four identity spaces of the
//! data model (spec §3), following the same pattern as the teacher's
//! `s2_common::record::{SeqNum, Timestamp}` type aliases-over-primitives,
//! upgraded to newtypes here because the four spaces must never be
//! confused with one another at a call site.

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

id_newtype!(SystemId, "Internal 64-bit identifier for a `System`.");
id_newtype!(FoiId, "Internal 64-bit identifier for a `FeatureOfInterest`.");
id_newtype!(StreamId, "Internal 64-bit identifier for a `DataStream`.");
id_newtype!(SeriesId, "Internal 64-bit identifier for an `ObservationSeries`.");

/// Caller-opaque handle for a single observation: `varLong(seriesId) ||
/// instant(phenomenonTime)`, bit-identical to the primary record key
/// (spec §4.1). Bytes, not an integer, so callers stay forward-compatible
/// with any future widening of the internal key layout (spec §9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationId(pub bytes::Bytes);

impl ObservationId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for ObservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
