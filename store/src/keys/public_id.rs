//! Public observation identifier (spec §4.1): `varLong(seriesId) ||
//! instant(phenomenonTime)`, bit-identical to `record_key`'s internal
//! primary key, exposed as [`obsdb_common::ObservationId`] bytes rather
//! than the internal `(SeriesId, Instant)` pair so callers stay
//! forward-compatible with any future key widening (spec §9).
//!
//! A malformed id is never an error: `decode` returns `None`, and
//! `get`/`put`/`remove` on `None` behave as "not found" (spec §7
//! `InvalidKey`).

use bytes::Bytes;
use obsdb_common::{Instant, ObservationId, SeriesId};

use super::record_key;

pub fn encode(series_id: SeriesId, phenomenon_time: Instant) -> ObservationId {
    ObservationId(record_key::ser_key(series_id, phenomenon_time))
}

pub fn decode(id: &ObservationId) -> Option<(SeriesId, Instant)> {
    record_key::deser_key(Bytes::copy_from_slice(id.as_bytes())).ok()
}
