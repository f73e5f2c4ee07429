//! `SeriesByFoi` key (spec §4.1): `u64(foiId) || u64(streamId) ||
//! instant(resultTime)`. Value is empty (spec §4.3: "insert into
//! `SeriesByStream` and `SeriesByFoi` (value=unit)") — this index exists
//! purely for the inverted FoI lookup; `seriesId` is recovered by
//! reassembling the `SeriesByStream` key from the triple and looking
//! that up ("inflate", spec §4.4).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_ordinalize::Ordinalize;
use obsdb_common::{FoiId, Instant, StreamId};

use super::{DeserializationError, KeyType, check_exact_size};

const KEY_LEN: usize = 1 + 8 + 8 + obsdb_common::time::ENCODED_LEN;

pub fn ser_key(foi_id: FoiId, stream_id: StreamId, result_time: Instant) -> Bytes {
    let mut buf = BytesMut::with_capacity(KEY_LEN);
    buf.put_u8(KeyType::SeriesByFoi.ordinal());
    buf.put_u64(foi_id.get());
    buf.put_u64(stream_id.get());
    result_time.put_encoded(&mut buf);
    debug_assert_eq!(buf.len(), KEY_LEN);
    buf.freeze()
}

pub fn deser_key(mut bytes: Bytes) -> Result<(FoiId, StreamId, Instant), DeserializationError> {
    check_exact_size(&bytes, KEY_LEN)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::SeriesByFoi.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    let foi_id = FoiId::new(bytes.get_u64());
    let stream_id = StreamId::new(bytes.get_u64());
    let result_time = Instant::get_from(&mut bytes)?;
    Ok((foi_id, stream_id, result_time))
}

pub fn ser_value() -> Bytes {
    Bytes::new()
}

pub fn deser_value(bytes: Bytes) -> Result<(), DeserializationError> {
    check_exact_size(&bytes, 0)?;
    Ok(())
}

/// `[start, end)` bound covering every series of one FoI, for the
/// planner's "driving set = foi" scan (spec §4.4).
pub fn foi_prefix_range(foi_id: FoiId) -> std::ops::Range<Bytes> {
    let mut prefix = BytesMut::with_capacity(9);
    prefix.put_u8(KeyType::SeriesByFoi.ordinal());
    prefix.put_u64(foi_id.get());
    let start = prefix.clone().freeze();
    let end = increment_bytes(prefix).expect("foi id prefix cannot be all-0xFF forever");
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
    fn roundtrip_empty_value() {
        let bytes = ser_value();
        deser_value(bytes).unwrap();
    }

    proptest! {
        #[test]
        fn roundtrip_series_by_foi_key(
            foi_id in any::<u64>(), stream_id in any::<u64>(),
            seconds in (i64::MIN + 1)..=i64::MAX, nanos in 0u32..1_000_000_000,
        ) {
            let foi_id = FoiId::new(foi_id);
            let stream_id = StreamId::new(stream_id);
            let result_time = Instant::at(seconds, nanos);
            let bytes = ser_key(foi_id, stream_id, result_time);
            let (decoded_foi, decoded_stream, decoded_time) = deser_key(bytes).unwrap();
            prop_assert_eq!(decoded_foi, foi_id);
            prop_assert_eq!(decoded_stream, stream_id);
            prop_assert_eq!(decoded_time, result_time);
        }
    }
}
