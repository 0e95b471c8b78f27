use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::firestore::error::{invalid_argument, unsupported_type, FirestoreResult};
use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{ArrayValue, BytesValue, FirestoreValue, MapValue, ValueKind};

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        FirestoreValue::from_bool(value)
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        FirestoreValue::from_integer(value)
    }
}

impl From<i32> for FirestoreValue {
    fn from(value: i32) -> Self {
        FirestoreValue::from_integer(i64::from(value))
    }
}

impl From<u32> for FirestoreValue {
    fn from(value: u32) -> Self {
        FirestoreValue::from_integer(i64::from(value))
    }
}

impl From<f64> for FirestoreValue {
    fn from(value: f64) -> Self {
        FirestoreValue::from_double(value)
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        FirestoreValue::from_string(value)
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        FirestoreValue::from_string(value)
    }
}

impl From<BytesValue> for FirestoreValue {
    fn from(value: BytesValue) -> Self {
        FirestoreValue::from_bytes(value)
    }
}

impl From<Timestamp> for FirestoreValue {
    fn from(value: Timestamp) -> Self {
        FirestoreValue::from_timestamp(value)
    }
}

impl From<DateTime<Utc>> for FirestoreValue {
    fn from(value: DateTime<Utc>) -> Self {
        FirestoreValue::from_timestamp(Timestamp::from(value))
    }
}

impl From<GeoPoint> for FirestoreValue {
    fn from(value: GeoPoint) -> Self {
        FirestoreValue::from_geo_point(value)
    }
}

impl From<MapValue> for FirestoreValue {
    fn from(value: MapValue) -> Self {
        FirestoreValue::from_map(value.into_fields())
    }
}

impl From<ArrayValue> for FirestoreValue {
    fn from(value: ArrayValue) -> Self {
        FirestoreValue::from_array(value.into_values())
    }
}

impl<T: Into<FirestoreValue>> From<Vec<T>> for FirestoreValue {
    fn from(values: Vec<T>) -> Self {
        FirestoreValue::from_array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FirestoreValue>> From<BTreeMap<String, T>> for FirestoreValue {
    fn from(map: BTreeMap<String, T>) -> Self {
        FirestoreValue::from_map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<FirestoreValue>> From<HashMap<String, T>> for FirestoreValue {
    fn from(map: HashMap<String, T>) -> Self {
        FirestoreValue::from_map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// `None` has no distinct wire form and is stored as null.
impl<T: Into<FirestoreValue>> From<Option<T>> for FirestoreValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(FirestoreValue::null)
    }
}

impl TryFrom<u64> for FirestoreValue {
    type Error = crate::firestore::error::FirestoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_type(format!("u64 value {value} does not fit in a 64-bit signed integer")))
    }
}

impl TryFrom<i128> for FirestoreValue {
    type Error = crate::firestore::error::FirestoreError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_type(format!("i128 value {value} does not fit in a 64-bit signed integer")))
    }
}

impl TryFrom<u128> for FirestoreValue {
    type Error = crate::firestore::error::FirestoreError;

    fn try_from(value: u128) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(FirestoreValue::from_integer)
            .map_err(|_| unsupported_type(format!("u128 value {value} does not fit in a 64-bit signed integer")))
    }
}

impl FirestoreValue {
    /// Converts a JSON value. Integers that fit in `i64` become integers and every
    /// other number becomes a double, except unsigned values above `i64::MAX`.
    pub fn from_json(value: JsonValue) -> FirestoreResult<Self> {
        Ok(match value {
            JsonValue::Null => FirestoreValue::null(),
            JsonValue::Bool(value) => FirestoreValue::from_bool(value),
            JsonValue::Number(number) => number_to_value(&number)?,
            JsonValue::String(value) => FirestoreValue::from_string(value),
            JsonValue::Array(values) => FirestoreValue::from_array(
                values
                    .into_iter()
                    .map(FirestoreValue::from_json)
                    .collect::<FirestoreResult<Vec<_>>>()?,
            ),
            JsonValue::Object(object) => {
                let mut fields = BTreeMap::new();
                for (key, value) in object {
                    fields.insert(key, FirestoreValue::from_json(value)?);
                }
                FirestoreValue::from_map(fields)
            }
        })
    }

    /// Plain JSON view of the value, used to feed `serde` deserialization.
    ///
    /// Timestamps become RFC 3339 strings, bytes become arrays of numbers, geopoints
    /// become `{latitude, longitude}` objects, and non-finite doubles become null.
    pub fn to_json(&self) -> FirestoreResult<JsonValue> {
        Ok(match self.kind() {
            ValueKind::Null => JsonValue::Null,
            ValueKind::Boolean(value) => JsonValue::Bool(*value),
            ValueKind::Integer(value) => JsonValue::Number(Number::from(*value)),
            ValueKind::Double(value) => Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ValueKind::Timestamp(timestamp) => JsonValue::String(timestamp.to_rfc3339()?),
            ValueKind::String(value) => JsonValue::String(value.clone()),
            ValueKind::Bytes(bytes) => JsonValue::Array(
                bytes
                    .as_slice()
                    .iter()
                    .map(|byte| JsonValue::Number(Number::from(*byte)))
                    .collect(),
            ),
            ValueKind::Reference(name) => JsonValue::String(name.clone()),
            ValueKind::GeoPoint(point) => {
                let mut object = JsonMap::new();
                object.insert("latitude".into(), json_f64(point.latitude()));
                object.insert("longitude".into(), json_f64(point.longitude()));
                JsonValue::Object(object)
            }
            ValueKind::Array(array) => JsonValue::Array(
                array
                    .values()
                    .iter()
                    .map(FirestoreValue::to_json)
                    .collect::<FirestoreResult<Vec<_>>>()?,
            ),
            ValueKind::Map(map) => {
                let mut object = JsonMap::new();
                for (key, value) in map.fields() {
                    object.insert(key.clone(), value.to_json()?);
                }
                JsonValue::Object(object)
            }
            ValueKind::Sentinel(sentinel) => {
                return Err(unsupported_type(format!(
                    "{} is a write marker and has no data representation",
                    sentinel.name()
                )))
            }
        })
    }
}

/// Serializes any `serde` value into a document field map.
///
/// The value must serialize to a JSON object.
pub fn to_firestore_map<T: Serialize + ?Sized>(
    value: &T,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    let json = serde_json::to_value(value)
        .map_err(|err| unsupported_type(format!("Value cannot be serialized: {err}")))?;
    match FirestoreValue::from_json(json)?.into_kind() {
        ValueKind::Map(map) => Ok(map.into_fields()),
        other => Err(invalid_argument(format!(
            "Document data must serialize to a map, got {}",
            other.type_name()
        ))),
    }
}

/// Deserializes a document field map into a `serde` type.
pub fn from_firestore_map<T: DeserializeOwned>(
    fields: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<T> {
    let mut object = JsonMap::new();
    for (key, value) in fields {
        object.insert(key.clone(), value.to_json()?);
    }
    serde_json::from_value(JsonValue::Object(object))
        .map_err(|err| invalid_argument(format!("Document data does not match the target type: {err}")))
}

fn number_to_value(number: &Number) -> FirestoreResult<FirestoreValue> {
    if let Some(integer) = number.as_i64() {
        return Ok(FirestoreValue::from_integer(integer));
    }
    if number.is_u64() {
        return Err(unsupported_type(format!(
            "Integer {number} does not fit in a 64-bit signed integer"
        )));
    }
    number
        .as_f64()
        .map(FirestoreValue::from_double)
        .ok_or_else(|| unsupported_type(format!("Number {number} cannot be represented")))
}

fn json_f64(value: f64) -> JsonValue {
    Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}
