//! `SeriesByStream` key (spec §4.1): fixed `u64(streamId) || u64(foiId)
//! || instant(resultTime)`. Value is the assigned `SeriesId` (8 bytes,
//! big-endian).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_ordinalize::Ordinalize;
use obsdb_common::{FoiId, Instant, SeriesId, StreamId};

use super::{DeserializationError, KeyType, check_exact_size};

const KEY_LEN: usize = 1 + 8 + 8 + obsdb_common::time::ENCODED_LEN;

pub fn ser_key(stream_id: StreamId, foi_id: FoiId, result_time: Instant) -> Bytes {
    let mut buf = BytesMut::with_capacity(KEY_LEN);
    buf.put_u8(KeyType::SeriesByStream.ordinal());
    buf.put_u64(stream_id.get());
    buf.put_u64(foi_id.get());
    result_time.put_encoded(&mut buf);
    debug_assert_eq!(buf.len(), KEY_LEN);
    buf.freeze()
}

pub fn deser_key(mut bytes: Bytes) -> Result<(StreamId, FoiId, Instant), DeserializationError> {
    check_exact_size(&bytes, KEY_LEN)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::SeriesByStream.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    let stream_id = StreamId::new(bytes.get_u64());
    let foi_id = FoiId::new(bytes.get_u64());
    let result_time = Instant::get_from(&mut bytes)?;
    Ok((stream_id, foi_id, result_time))
}

pub fn ser_value(series_id: SeriesId) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(series_id.get());
    buf.freeze()
}

pub fn deser_value(mut bytes: Bytes) -> Result<SeriesId, DeserializationError> {
    check_exact_size(&bytes, 8)?;
    Ok(SeriesId::new(bytes.get_u64()))
}

/// `[start, end)` bound covering every series of one stream, for the
/// planner's "driving set = stream" scan (spec §4.4): the fixed prefix
/// `keyType || streamId`, bumped to the next prefix.
pub fn stream_prefix_range(stream_id: StreamId) -> std::ops::Range<Bytes> {
    let mut prefix = BytesMut::with_capacity(9);
    prefix.put_u8(KeyType::SeriesByStream.ordinal());
    prefix.put_u64(stream_id.get());
    let start = prefix.clone().freeze();
    let end = increment_bytes(prefix).expect("stream id prefix cannot be all-0xFF forever");
    start..end
}

fn increment_bytes(mut buf: BytesMut) -> Option<Bytes> {
    for i in (0..buf.len()).rev() {
        if buf[i] < 0xFF {
            buf[i] += 1;
            buf.truncate(i + 1);
            return Some(buf.freeze());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn roundtrip_series_by_stream_value() {
        let series_id = SeriesId::new(42);
        let bytes = ser_value(series_id);
        assert_eq!(deser_value(bytes).unwrap(), series_id);
    }

    proptest! {
        #[test]
        fn roundtrip_series_key(
            stream_id in any::<u64>(), foi_id in any::<u64>(),
            seconds in (i64::MIN + 1)..=i64::MAX, nanos in 0u32..1_000_000_000,
        ) {
            let stream_id = StreamId::new(stream_id);
            let foi_id = FoiId::new(foi_id);
            let result_time = Instant::at(seconds, nanos);
            let bytes = ser_key(stream_id, foi_id, result_time);
            let (decoded_stream, decoded_foi, decoded_time) = deser_key(bytes).unwrap();
            prop_assert_eq!(decoded_stream, stream_id);
            prop_assert_eq!(decoded_foi, foi_id);
            prop_assert_eq!(decoded_time, result_time);
        }
    }
}
