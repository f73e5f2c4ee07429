//! Bit-exact key encoding (spec §4.1). All composite keys sort
//! consistently with their logical order under unsigned-lexicographic
//! byte comparison, which is what the underlying engine's range scans
//! rely on.

pub mod public_id;
pub mod record_key;
pub mod registry_keys;
pub mod series_by_foi_key;
pub mod series_key;

use std::ops::Range;

use bytes::{Buf, Bytes};
use enum_ordinalize::Ordinalize;
use obsdb_common::{FoiId, Instant, InstantDecodeError, SeriesId, StreamId, SystemId};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DeserializationError {
    #[error("invalid ordinal: {0}")]
    InvalidOrdinal(u8),
    #[error("invalid size: expected {expected} bytes, got {actual}")]
    InvalidSize { expected: usize, actual: usize },
    #[error("invalid instant: {0}")]
    InvalidInstant(#[from] InstantDecodeError),
    #[error("missing field separator")]
    MissingFieldSeparator,
    #[error("invalid utf-8 in key field")]
    InvalidUtf8,
    #[error("json serialization error: {0}")]
    Json(String),
}

/// IDs persisted as the leading byte of every key so must be kept stable.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ordinalize)]
pub enum KeyType {
    SystemMeta = 1,
    SystemStringIndex = 2,
    FoiMeta = 3,
    StreamMeta = 4,
    StreamLookup = 5,
    SeriesByStream = 6,
    SeriesByFoi = 7,
    ObsRecord = 8,
    Counter = 9,
    FoiStringIndex = 10,
}

#[derive(Debug, Clone)]
pub enum Key {
    /// (SYM) per-system, updatable. Key: SystemId. Value: SystemMeta.
    SystemMeta(SystemId),
    /// (SSI) per-system, immutable. Key: string id. Value: SystemId.
    SystemStringIndex(String),
    /// (FOM) per-foi, updatable. Key: FoiId. Value: FoiMeta.
    FoiMeta(FoiId),
    /// (STM) per-stream, updatable. Key: StreamId. Value: StreamMeta.
    StreamMeta(StreamId),
    /// (STL) per-stream, immutable. Key: SystemId \0 outputName \0
    /// validTimeStartMillis. Value: StreamId. Used for idempotent
    /// `getOrCreateStream` and hash-collision probing.
    StreamLookup(SystemId, String, i64),
    /// (SBS) per-series, updatable. Key: StreamId StreamId FoiId
    /// Instant(resultTime). Value: SeriesId.
    SeriesByStream(StreamId, FoiId, Instant),
    /// (SBF) per-series, updatable, inverted. Key: FoiId StreamId
    /// Instant(resultTime). Value: empty (spec §4.3: "value=unit").
    SeriesByFoi(FoiId, StreamId, Instant),
    /// (OBR) per-record, immutable. Key: varLong(SeriesId)
    /// Instant(phenomenonTime). Value: ObservationRecord bytes.
    ObsRecord(SeriesId, Instant),
    /// (CTR) per-counter, updatable. Key: counter kind byte. Value:
    /// next-id u64. See `registry_keys::CounterKind`.
    Counter(registry_keys::CounterKind),
    /// (FSI) per-foi, immutable. Key: string id. Value: FoiId.
    FoiStringIndex(String),
}

impl From<Key> for Bytes {
    fn from(value: Key) -> Self {
        match value {
            Key::SystemMeta(id) => registry_keys::ser_system_meta_key(id),
            Key::SystemStringIndex(string_id) => {
                registry_keys::ser_system_string_index_key(&string_id)
            }
            Key::FoiMeta(id) => registry_keys::ser_foi_meta_key(id),
            Key::StreamMeta(id) => registry_keys::ser_stream_meta_key(id),
            Key::StreamLookup(system_id, output_name, valid_time_start_millis) => {
                registry_keys::ser_stream_lookup_key(
                    system_id,
                    &output_name,
                    valid_time_start_millis,
                )
            }
            Key::SeriesByStream(stream_id, foi_id, result_time) => {
                series_key::ser_key(stream_id, foi_id, result_time)
            }
            Key::SeriesByFoi(foi_id, stream_id, result_time) => {
                series_by_foi_key::ser_key(foi_id, stream_id, result_time)
            }
            Key::ObsRecord(series_id, phenomenon_time) => {
                record_key::ser_key(series_id, phenomenon_time)
            }
            Key::Counter(kind) => registry_keys::ser_counter_key(kind),
            Key::FoiStringIndex(string_id) => registry_keys::ser_foi_string_index_key(&string_id),
        }
    }
}

impl TryFrom<Bytes> for Key {
    type Error = DeserializationError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        check_min_size(&bytes, 1)?;
        let ordinal = KeyType::from_ordinal(bytes[0])
            .ok_or_else(|| DeserializationError::InvalidOrdinal(bytes[0]))?;
        match ordinal {
            KeyType::SystemMeta => registry_keys::deser_system_meta_key(bytes).map(Key::SystemMeta),
            KeyType::SystemStringIndex => {
                registry_keys::deser_system_string_index_key(bytes).map(Key::SystemStringIndex)
            }
            KeyType::FoiMeta => registry_keys::deser_foi_meta_key(bytes).map(Key::FoiMeta),
            KeyType::StreamMeta => registry_keys::deser_stream_meta_key(bytes).map(Key::StreamMeta),
            KeyType::StreamLookup => registry_keys::deser_stream_lookup_key(bytes)
                .map(|(s, n, t)| Key::StreamLookup(s, n, t)),
            KeyType::SeriesByStream => {
                series_key::deser_key(bytes).map(|(s, f, r)| Key::SeriesByStream(s, f, r))
            }
            KeyType::SeriesByFoi => {
                series_by_foi_key::deser_key(bytes).map(|(f, s, r)| Key::SeriesByFoi(f, s, r))
            }
            KeyType::ObsRecord => {
                record_key::deser_key(bytes).map(|(s, p)| Key::ObsRecord(s, p))
            }
            KeyType::Counter => registry_keys::deser_counter_key(bytes).map(Key::Counter),
            KeyType::FoiStringIndex => {
                registry_keys::deser_foi_string_index_key(bytes).map(Key::FoiStringIndex)
            }
        }
    }
}

pub(crate) fn check_exact_size(bytes: &Bytes, expected: usize) -> Result<(), DeserializationError> {
    if bytes.remaining() != expected {
        return Err(DeserializationError::InvalidSize {
            expected,
            actual: bytes.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn check_min_size(bytes: &Bytes, min: usize) -> Result<(), DeserializationError> {
    if bytes.remaining() < min {
        return Err(DeserializationError::InvalidSize {
            expected: min,
            actual: bytes.remaining(),
        });
    }
    Ok(())
}

/// The `[start, end)` byte range covering every key of one `KeyType`,
/// used to drive a full-index scan (e.g. compaction, `list`).
pub fn key_type_range(key_type: KeyType) -> Range<Bytes> {
    let ordinal = key_type.ordinal();
    let start = Bytes::from(vec![ordinal]);
    let end = Bytes::from(vec![
        ordinal.checked_add(1).expect("key type ordinal overflow"),
    ]);
    start..end
}

/// Splits a null-delimited field out of a key buffer, consuming through
/// the separator. Used by the variable-length registry keys.
pub(crate) fn split_field(bytes: &mut Bytes) -> Result<Bytes, DeserializationError> {
    let Some(sep) = bytes.iter().position(|&b| b == 0) else {
        return Err(DeserializationError::MissingFieldSeparator);
    };
    let field = bytes.copy_to_bytes(sep);
    bytes.advance(1);
    Ok(field)
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;

    #[test]
    fn error_on_invalid_ordinal() {
        let bytes = Bytes::from(vec![255u8]);
        let result = Key::try_from(bytes);
        assert!(matches!(
            result,
            Err(DeserializationError::InvalidOrdinal(255))
        ));
    }

    #[test]
    fn error_on_insufficient_data() {
        let bytes = Bytes::from(vec![KeyType::FoiMeta.ordinal(), 1, 2, 3]);
        let result = Key::try_from(bytes);
        assert!(matches!(
            result,
            Err(DeserializationError::InvalidSize { .. })
        ));
    }

    #[test]
    fn error_on_missing_separator_in_stream_lookup() {
        let mut buf = BytesMut::new();
        buf.put_u8(KeyType::StreamLookup.ordinal());
        buf.put_slice(b"no-separator-here");
        let bytes = buf.freeze();
        let result = Key::try_from(bytes);
        assert!(matches!(
            result,
            Err(DeserializationError::MissingFieldSeparator)
        ));
    }
}
