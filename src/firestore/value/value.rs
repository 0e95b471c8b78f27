use std::collections::BTreeMap;

use crate::firestore::model::{FieldPath, GeoPoint, Timestamp};
use crate::firestore::value::{ArrayValue, BytesValue, MapValue};

#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

/// Write-time markers that compile into field transforms, masks, or deletes.
///
/// Sentinels are only meaningful as leaf values inside a write payload and are
/// never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum SentinelValue {
    ServerTimestamp,
    Delete,
    Increment(Box<FirestoreValue>),
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
}

impl SentinelValue {
    pub fn name(&self) -> &'static str {
        match self {
            SentinelValue::ServerTimestamp => "server_timestamp()",
            SentinelValue::Delete => "delete_field()",
            SentinelValue::Increment(_) => "increment()",
            SentinelValue::ArrayUnion(_) => "array_union()",
            SentinelValue::ArrayRemove(_) => "array_remove()",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Bytes(BytesValue),
    Reference(String),
    GeoPoint(GeoPoint),
    Array(ArrayValue),
    Map(MapValue),
    Sentinel(SentinelValue),
}

impl ValueKind {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean(_) => "boolean",
            ValueKind::Integer(_) => "integer",
            ValueKind::Double(_) => "double",
            ValueKind::Timestamp(_) => "timestamp",
            ValueKind::String(_) => "string",
            ValueKind::Bytes(_) => "bytes",
            ValueKind::Reference(_) => "reference",
            ValueKind::GeoPoint(_) => "geopoint",
            ValueKind::Array(_) => "array",
            ValueKind::Map(_) => "map",
            ValueKind::Sentinel(sentinel) => sentinel.name(),
        }
    }
}

impl FirestoreValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_bytes(value: impl Into<BytesValue>) -> Self {
        Self {
            kind: ValueKind::Bytes(value.into()),
        }
    }

    /// Reference to another document, given as its full resource name.
    pub fn from_reference(name: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Reference(name.into()),
        }
    }

    pub fn from_geo_point(value: GeoPoint) -> Self {
        Self {
            kind: ValueKind::GeoPoint(value),
        }
    }

    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Array(ArrayValue::new(values)),
        }
    }

    pub fn from_map(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Map(MapValue::new(map)),
        }
    }

    /// Sentinel asking the backend to store its own commit time in the field.
    pub fn server_timestamp() -> Self {
        Self::sentinel(SentinelValue::ServerTimestamp)
    }

    /// Sentinel removing the field. Valid in `update` and merging `set` calls.
    pub fn delete_field() -> Self {
        Self::sentinel(SentinelValue::Delete)
    }

    /// Sentinel adding `operand` to the stored number (missing fields count as zero).
    pub fn increment(operand: impl Into<FirestoreValue>) -> Self {
        Self::sentinel(SentinelValue::Increment(Box::new(operand.into())))
    }

    /// Sentinel appending each element not already present in the stored array.
    pub fn array_union(elements: Vec<FirestoreValue>) -> Self {
        Self::sentinel(SentinelValue::ArrayUnion(elements))
    }

    /// Sentinel removing every occurrence of each element from the stored array.
    pub fn array_remove(elements: Vec<FirestoreValue>) -> Self {
        Self::sentinel(SentinelValue::ArrayRemove(elements))
    }

    fn sentinel(sentinel: SentinelValue) -> Self {
        Self {
            kind: ValueKind::Sentinel(sentinel),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, ValueKind::Sentinel(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric value as a float, accepting both integers and doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value as f64),
            ValueKind::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self.kind {
            ValueKind::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match &self.kind {
            ValueKind::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            ValueKind::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Walks nested maps following `path`.
    pub fn get_path(&self, path: &FieldPath) -> Option<&FirestoreValue> {
        path.segments()
            .iter()
            .try_fold(self, |current, segment| current.as_map()?.get(segment))
    }
}
