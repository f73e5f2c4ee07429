//! `ObsRecords` primary key (spec §4.1): `varLong(seriesId) ||
//! instant(phenomenonTime)`. varLong is ordered only within a single
//! `seriesId` prefix — lookup always scans within a fixed series, so
//! that's sufficient; there is no requirement that two different
//! `seriesId`s compare in numeric order against each other.
//!
//! Bit-identical to the public observation id (`keys::public_id`).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_ordinalize::Ordinalize;
use obsdb_common::{FoiId, Instant, SeriesId};

use super::{DeserializationError, KeyType, check_min_size};

/// Unsigned LEB128 varint, matching the common "varLong" shorthand used
/// throughout the spec for series ids.
pub fn put_var_u64(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

pub fn get_var_u64(bytes: &mut Bytes) -> Result<u64, DeserializationError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !bytes.has_remaining() {
            return Err(DeserializationError::InvalidSize {
                expected: 1,
                actual: 0,
            });
        }
        let byte = bytes.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(value)
}

pub fn ser_key(series_id: SeriesId, phenomenon_time: Instant) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 10 + obsdb_common::time::ENCODED_LEN);
    buf.put_u8(KeyType::ObsRecord.ordinal());
    put_var_u64(&mut buf, series_id.get());
    phenomenon_time.put_encoded(&mut buf);
    buf.freeze()
}

pub fn deser_key(mut bytes: Bytes) -> Result<(SeriesId, Instant), DeserializationError> {
    check_min_size(&bytes, 1 + obsdb_common::time::ENCODED_LEN)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::ObsRecord.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    let series_id = SeriesId::new(get_var_u64(&mut bytes)?);
    let phenomenon_time = Instant::get_from(&mut bytes)?;
    Ok((series_id, phenomenon_time))
}

/// The lower-bound key for a forward scan over every record of one
/// series: `(seriesId, -infinity)`, i.e. the series prefix.
pub fn series_lower_bound(series_id: SeriesId) -> Bytes {
    ser_key(series_id, Instant::MIN)
}

/// The upper (exclusive) bound key for a scan over every record of one
/// series: `(seriesId, +infinity]` — callers range to `..=` this key or
/// treat it as the inclusive ceiling, since there is no `seriesId + 1`
/// concept independent of phenomenon time.
pub fn series_upper_bound(series_id: SeriesId) -> Bytes {
    ser_key(series_id, Instant::MAX)
}

/// `ObsRecord` value: `foiId || instant(resultTime) || encoded result`.
/// `foiId`/`resultTime` are constant for every record of a series (they're
/// exactly what `resolve_or_create_series` fixed when the series was first
/// created) but are carried per-record anyway so a lookup by public id
/// never needs a second index hop to reconstruct a full observation.
pub fn ser_value(foi_id: FoiId, result_time: Instant, encoded_result: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + obsdb_common::time::ENCODED_LEN + encoded_result.len());
    buf.put_u64(foi_id.get());
    result_time.put_encoded(&mut buf);
    buf.put_slice(encoded_result);
    buf.freeze()
}

pub fn deser_value(mut bytes: Bytes) -> Result<(FoiId, Instant, Bytes), DeserializationError> {
    check_min_size(&bytes, 8 + obsdb_common::time::ENCODED_LEN)?;
    let foi_id = FoiId::new(bytes.get_u64());
    let result_time = Instant::get_from(&mut bytes)?;
    Ok((foi_id, result_time, bytes))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn roundtrip_varint_small_and_large() {
        for value in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut buf = BytesMut::new();
            put_var_u64(&mut buf, value);
            let mut bytes = buf.freeze();
            assert_eq!(get_var_u64(&mut bytes).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_record_value() {
        let bytes = ser_value(FoiId::new(42), Instant::at(100, 0), b"\"hello\"");
        let (foi_id, result_time, result) = deser_value(bytes).unwrap();
        assert_eq!(foi_id, FoiId::new(42));
        assert_eq!(result_time, Instant::at(100, 0));
        assert_eq!(&result[..], b"\"hello\"");
    }

    proptest! {
        #[test]
        fn roundtrip_record_key(
            series_id in any::<u64>(),
            seconds in (i64::MIN + 1)..=i64::MAX,
            nanos in 0u32..1_000_000_000,
        ) {
            let series_id = SeriesId::new(series_id);
            let phenomenon_time = Instant::at(seconds, nanos);
            let bytes = ser_key(series_id, phenomenon_time);
            let (decoded_series, decoded_time) = deser_key(bytes).unwrap();
            prop_assert_eq!(decoded_series, series_id);
            prop_assert_eq!(decoded_time, phenomenon_time);
        }

        #[test]
        fn monotone_order_within_one_series(
            series_id in any::<u64>(),
            a_secs in (i64::MIN + 1)..=i64::MAX, a_nanos in 0u32..1_000_000_000,
            b_secs in (i64::MIN + 1)..=i64::MAX, b_nanos in 0u32..1_000_000_000,
        ) {
            let series_id = SeriesId::new(series_id);
            let a = Instant::at(a_secs, a_nanos);
            let b = Instant::at(b_secs, b_nanos);
            let key_a = ser_key(series_id, a);
            let key_b = ser_key(series_id, b);
            prop_assert_eq!(a < b, key_a < key_b);
        }
    }
}
