//! The dynamically-typed observation payload tree and the record shape it
//! is carried in (spec §3, §9). Encoding is delegated to the owning
//! stream's [`RecordEncoding`]; only [`RecordEncoding::Json`] is
//! implemented, matching the "opaque bytes, encoding is the stream's
//! business" note in spec §9.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::FoiId;
use crate::time::Instant;

/// A single scalar leaf of a [`ResultValue`] tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// The dynamically-typed observation result (spec §9: "the result value's
/// internal shape is not fixed by the engine"). A tagged tree rather than
/// a flat scalar so record-type and array-type streams can be represented
/// without a second code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Scalar(Scalar),
    Record(BTreeMap<String, ResultValue>),
    Array(Vec<ResultValue>),
}

impl ResultValue {
    pub fn scalar_double(value: f64) -> Self {
        ResultValue::Scalar(Scalar::Double(value))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ResultValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric projection used by the statistics engine (spec §4.5):
    /// only `Int`/`Double` scalars contribute to min/max/sum, anything
    /// else (record, array, text, bool, bytes) is simply excluded.
    pub fn as_f64(&self) -> Option<f64> {
        match self.as_scalar()? {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Double(v) => Some(*v),
            _ => None,
        }
    }
}

/// Names the wire encoding a stream's observation results are stored in.
/// Carried on the stream registration so `put`/`get` know how to turn
/// bytes back into a [`ResultValue`] without guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordEncoding {
    Json,
}

impl RecordEncoding {
    pub fn encode(&self, value: &ResultValue) -> Result<Bytes, EncodingError> {
        match self {
            RecordEncoding::Json => {
                let bytes = serde_json::to_vec(value)?;
                Ok(Bytes::from(bytes))
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ResultValue, EncodingError> {
        match self {
            RecordEncoding::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("result value encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single observation as presented at the public read/write surface
/// (spec §3's `Observation` entity): the caller-facing shape, before it
/// is split across the three correlated indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub foi_id: FoiId,
    pub phenomenon_time: Instant,
    pub result_time: Instant,
    pub result: ResultValue,
}

/// The persisted form of an [`Observation`]: same fields, plus the
/// series it belongs to, denormalized onto the record so a reader never
/// needs a second lookup to know which FoI/stream produced it (spec §4.3
/// "ObsRecords" entry shape).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub foi_id: FoiId,
    pub phenomenon_time: Instant,
    pub result_time: Instant,
    pub result: ResultValue,
}

impl ObservationRecord {
    pub fn from_observation(observation: Observation) -> Self {
        ObservationRecord {
            foi_id: observation.foi_id,
            phenomenon_time: observation.phenomenon_time,
            result_time: observation.result_time,
            result: observation.result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_of_a_record_shaped_result() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "temperature".to_string(),
            ResultValue::scalar_double(21.5),
        );
        fields.insert(
            "unit".to_string(),
            ResultValue::Scalar(Scalar::Text("C".to_string())),
        );
        let value = ResultValue::Record(fields);

        let encoded = RecordEncoding::Json.encode(&value).unwrap();
        let decoded = RecordEncoding::Json.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn non_numeric_scalars_are_excluded_from_numeric_projection() {
        assert_eq!(
            ResultValue::Scalar(Scalar::Text("x".into())).as_f64(),
            None
        );
        assert_eq!(ResultValue::scalar_double(3.0).as_f64(), Some(3.0));
    }
}
