//! Keys and value payloads for the system/FoI/stream registries (spec
//! §4.2, SPEC_FULL §4.2). Grounded on the teacher's `kv::basin_meta`
//! shape: a JSON-encoded value behind a fixed or variable-length key.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_ordinalize::Ordinalize;
use obsdb_common::{FoiId, Instant, RecordEncoding, StreamId, SystemId};
use serde::{Deserialize, Serialize};

use super::{DeserializationError, KeyType, check_min_size, split_field};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ordinalize, Serialize, Deserialize)]
pub enum CounterKind {
    System = 1,
    Foi = 2,
    Stream = 3,
    Series = 4,
}

pub fn ser_counter_key(kind: CounterKind) -> Bytes {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u8(KeyType::Counter.ordinal());
    buf.put_u8(kind.ordinal());
    buf.freeze()
}

pub fn deser_counter_key(mut bytes: Bytes) -> Result<CounterKind, DeserializationError> {
    super::check_exact_size(&bytes, 2)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::Counter.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    let kind_byte = bytes.get_u8();
    CounterKind::from_ordinal(kind_byte).ok_or(DeserializationError::InvalidOrdinal(kind_byte))
}

pub fn ser_counter_value(next: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(next);
    buf.freeze()
}

pub fn deser_counter_value(mut bytes: Bytes) -> Result<u64, DeserializationError> {
    super::check_exact_size(&bytes, 8)?;
    Ok(bytes.get_u64())
}

fn ser_id_key(key_type: KeyType, id: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(key_type.ordinal());
    buf.put_u64(id);
    buf.freeze()
}

fn deser_id_key(key_type: KeyType, mut bytes: Bytes) -> Result<u64, DeserializationError> {
    super::check_exact_size(&bytes, 9)?;
    let ordinal = bytes.get_u8();
    if ordinal != key_type.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    Ok(bytes.get_u64())
}

pub fn ser_system_meta_key(id: SystemId) -> Bytes {
    ser_id_key(KeyType::SystemMeta, id.get())
}

pub fn deser_system_meta_key(bytes: Bytes) -> Result<SystemId, DeserializationError> {
    deser_id_key(KeyType::SystemMeta, bytes).map(SystemId::new)
}

pub fn ser_foi_meta_key(id: FoiId) -> Bytes {
    ser_id_key(KeyType::FoiMeta, id.get())
}

pub fn deser_foi_meta_key(bytes: Bytes) -> Result<FoiId, DeserializationError> {
    deser_id_key(KeyType::FoiMeta, bytes).map(FoiId::new)
}

pub fn ser_stream_meta_key(id: StreamId) -> Bytes {
    ser_id_key(KeyType::StreamMeta, id.get())
}

pub fn deser_stream_meta_key(bytes: Bytes) -> Result<StreamId, DeserializationError> {
    deser_id_key(KeyType::StreamMeta, bytes).map(StreamId::new)
}

pub fn ser_system_string_index_key(string_id: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + string_id.len());
    buf.put_u8(KeyType::SystemStringIndex.ordinal());
    buf.put_slice(string_id.as_bytes());
    buf.freeze()
}

pub fn deser_system_string_index_key(mut bytes: Bytes) -> Result<String, DeserializationError> {
    check_min_size(&bytes, 1)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::SystemStringIndex.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| DeserializationError::InvalidUtf8)
}

pub fn ser_system_string_index_value(id: SystemId) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(id.get());
    buf.freeze()
}

pub fn deser_system_string_index_value(mut bytes: Bytes) -> Result<SystemId, DeserializationError> {
    super::check_exact_size(&bytes, 8)?;
    Ok(SystemId::new(bytes.get_u64()))
}

/// `(systemId, outputName, validTimeStartMillis) -> streamId`: backs
/// idempotent `getOrCreateStream` (spec §8 invariant 8) and sequential
/// hash-collision probing (spec §4.2).
pub fn ser_stream_lookup_key(system_id: SystemId, output_name: &str, valid_time_start_millis: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 8 + 1 + output_name.len() + 1 + 8);
    buf.put_u8(KeyType::StreamLookup.ordinal());
    buf.put_u64(system_id.get());
    buf.put_u8(0);
    buf.put_slice(output_name.as_bytes());
    buf.put_u8(0);
    buf.put_i64(valid_time_start_millis);
    buf.freeze()
}

pub fn deser_stream_lookup_key(
    mut bytes: Bytes,
) -> Result<(SystemId, String, i64), DeserializationError> {
    check_min_size(&bytes, 1)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::StreamLookup.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    check_min_size(&bytes, 8)?;
    let system_id = SystemId::new(bytes.get_u64());
    let mut rest = bytes;
    let output_name_bytes = split_field(&mut rest)?;
    let output_name =
        String::from_utf8(output_name_bytes.to_vec()).map_err(|_| DeserializationError::InvalidUtf8)?;
    super::check_exact_size(&rest, 8)?;
    let valid_time_start_millis = rest.get_i64();
    Ok((system_id, output_name, valid_time_start_millis))
}

pub fn ser_stream_lookup_value(stream_id: StreamId) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(stream_id.get());
    buf.freeze()
}

pub fn deser_stream_lookup_value(mut bytes: Bytes) -> Result<StreamId, DeserializationError> {
    super::check_exact_size(&bytes, 8)?;
    Ok(StreamId::new(bytes.get_u64()))
}

pub fn ser_foi_string_index_key(string_id: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + string_id.len());
    buf.put_u8(KeyType::FoiStringIndex.ordinal());
    buf.put_slice(string_id.as_bytes());
    buf.freeze()
}

pub fn deser_foi_string_index_key(mut bytes: Bytes) -> Result<String, DeserializationError> {
    check_min_size(&bytes, 1)?;
    let ordinal = bytes.get_u8();
    if ordinal != KeyType::FoiStringIndex.ordinal() {
        return Err(DeserializationError::InvalidOrdinal(ordinal));
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| DeserializationError::InvalidUtf8)
}

pub fn ser_foi_string_index_value(id: FoiId) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(id.get());
    buf.freeze()
}

pub fn deser_foi_string_index_value(mut bytes: Bytes) -> Result<FoiId, DeserializationError> {
    super::check_exact_size(&bytes, 8)?;
    Ok(FoiId::new(bytes.get_u64()))
}

/// A single field of a stream's record structure (spec §3: "tree of
/// scalars/records/vectors with units & observable URIs"). Modeled as a
/// flat field list rather than a fully recursive tree — see DESIGN.md —
/// since no store operation inspects nested structure; only the runtime
/// `ResultValue` payload needs the recursive tagged tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub observable_uri: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStructure {
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Live,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub system_id: SystemId,
    pub output_name: String,
    pub structure: RecordStructure,
    pub encoding: RecordEncoding,
    pub valid_time_start: Instant,
    pub valid_time_end: Option<Instant>,
    pub state: StreamState,
}

pub fn ser_stream_meta_value(meta: &StreamMeta) -> Bytes {
    Bytes::from(serde_json::to_vec(meta).expect("StreamMeta is always serializable"))
}

pub fn deser_stream_meta_value(bytes: Bytes) -> Result<StreamMeta, DeserializationError> {
    serde_json::from_slice(&bytes).map_err(|e| DeserializationError::Json(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMeta {
    pub string_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sensorml_description: Option<String>,
    pub parent_group_id: Option<SystemId>,
    pub valid_time_start: Instant,
    pub outputs: Vec<String>,
    pub control_inputs: Vec<String>,
}

pub fn ser_system_meta_value(meta: &SystemMeta) -> Bytes {
    Bytes::from(serde_json::to_vec(meta).expect("SystemMeta is always serializable"))
}

pub fn deser_system_meta_value(bytes: Bytes) -> Result<SystemMeta, DeserializationError> {
    serde_json::from_slice(&bytes).map_err(|e| DeserializationError::Json(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoiMeta {
    pub string_id: String,
    /// Well-known-text geometry, stored opaquely; geometric indexing
    /// beyond this identifier lookup is out of scope (spec §1).
    pub geometry_wkt: Option<String>,
    pub metadata: Option<String>,
}

pub fn ser_foi_meta_value(meta: &FoiMeta) -> Bytes {
    Bytes::from(serde_json::to_vec(meta).expect("FoiMeta is always serializable"))
}

pub fn deser_foi_meta_value(bytes: Bytes) -> Result<FoiMeta, DeserializationError> {
    serde_json::from_slice(&bytes).map_err(|e| DeserializationError::Json(e.to_string()))
}
