use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::firestore::api::operations::{FieldTransform, TransformOperation};
use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::{
    internal_error, malformed_wire_value, unsupported_type, FirestoreResult,
};
use crate::firestore::model::{DatabaseId, DocumentKey, FieldPath, GeoPoint, Timestamp};
use crate::firestore::remote::datastore::{Precondition, WriteOperation};
use crate::firestore::remote::wire::{
    WireArrayValue, WireDocument, WireDocumentMask, WireDocumentTransform, WireFieldTransform,
    WireGeoPoint, WireMapValue, WirePrecondition, WireTransformOperation, WireValue, WireWrite,
};
use crate::firestore::value::{BytesValue, FirestoreValue, MapValue, ValueKind};

const REQUEST_TIME: &str = "REQUEST_TIME";

/// Converts between in-memory values and the REST JSON representation for one database.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    database_id: DatabaseId,
}

impl JsonProtoSerializer {
    pub fn new(database_id: DatabaseId) -> Self {
        Self { database_id }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn database_name(&self) -> String {
        self.database_id.resource_name()
    }

    /// Full resource name: `projects/{p}/databases/{d}/documents/{path}`.
    pub fn document_name(&self, key: &DocumentKey) -> String {
        format!(
            "{}/documents/{}",
            self.database_name(),
            key.path().canonical_string()
        )
    }

    pub fn parse_document_name(&self, name: &str) -> FirestoreResult<DocumentKey> {
        let prefix = format!("{}/documents/", self.database_name());
        let relative = name.strip_prefix(&prefix).ok_or_else(|| {
            internal_error(format!(
                "Unexpected document name '{name}' returned by Firestore"
            ))
        })?;
        DocumentKey::from_string(relative)
    }

    pub fn encode_value(&self, value: &FirestoreValue) -> FirestoreResult<WireValue> {
        encode_value(value)
    }

    /// Encodes map entries, silently skipping sentinel values.
    pub fn encode_fields(
        &self,
        fields: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<BTreeMap<String, WireValue>> {
        encode_fields(fields)
    }

    pub fn decode_value(&self, value: &WireValue) -> FirestoreResult<FirestoreValue> {
        decode_value(value)
    }

    pub fn decode_fields(
        &self,
        fields: &BTreeMap<String, WireValue>,
    ) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
        decode_fields(fields)
    }

    /// Decodes one tagged JSON value. Untagged or unknown input is `MalformedWireValue`.
    pub fn decode_value_json(&self, value: &JsonValue) -> FirestoreResult<FirestoreValue> {
        let wire = WireValue::deserialize_json(value)?;
        decode_value(&wire)
    }

    pub fn decode_document(&self, document: &WireDocument) -> FirestoreResult<DocumentSnapshot> {
        let name = document
            .name
            .as_deref()
            .ok_or_else(|| internal_error("Firestore document is missing its 'name'"))?;
        let key = self.parse_document_name(name)?;
        Ok(DocumentSnapshot::new(
            key,
            Some(MapValue::new(decode_fields(&document.fields)?)),
        )
        .with_times(
            parse_optional_timestamp(document.create_time.as_deref())?,
            parse_optional_timestamp(document.update_time.as_deref())?,
        ))
    }

    pub fn encode_write(&self, write: &WriteOperation) -> FirestoreResult<WireWrite> {
        match write {
            WriteOperation::Upsert {
                key,
                fields,
                mask,
                transforms,
                precondition,
            } => Ok(WireWrite {
                update: Some(WireDocument {
                    name: Some(self.document_name(key)),
                    fields: encode_fields(fields.fields())?,
                    ..Default::default()
                }),
                update_mask: mask.as_ref().map(|paths| encode_mask(paths)),
                update_transforms: encode_field_transforms(transforms)?,
                current_document: precondition.as_ref().map(encode_precondition).transpose()?,
                ..Default::default()
            }),
            WriteOperation::Delete { key } => Ok(WireWrite {
                delete: Some(self.document_name(key)),
                ..Default::default()
            }),
            WriteOperation::TransformOnly {
                key,
                transforms,
                precondition,
            } => Ok(WireWrite {
                transform: Some(WireDocumentTransform {
                    document: self.document_name(key),
                    field_transforms: encode_field_transforms(transforms)?,
                }),
                current_document: precondition.as_ref().map(encode_precondition).transpose()?,
                ..Default::default()
            }),
        }
    }
}

impl WireValue {
    pub(crate) fn deserialize_json(value: &JsonValue) -> FirestoreResult<WireValue> {
        serde_json::from_value(value.clone())
            .map_err(|err| malformed_wire_value(format!("Invalid Firestore value {value}: {err}")))
    }
}

fn encode_fields(
    fields: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<BTreeMap<String, WireValue>> {
    let mut encoded = BTreeMap::new();
    for (key, value) in fields {
        if value.is_sentinel() {
            continue;
        }
        encoded.insert(key.clone(), encode_value(value)?);
    }
    Ok(encoded)
}

fn encode_value(value: &FirestoreValue) -> FirestoreResult<WireValue> {
    Ok(match value.kind() {
        ValueKind::Null => WireValue::NullValue(()),
        ValueKind::Boolean(value) => WireValue::BooleanValue(*value),
        ValueKind::Integer(value) => WireValue::IntegerValue(value.to_string()),
        ValueKind::Double(value) => WireValue::DoubleValue(*value),
        ValueKind::Timestamp(timestamp) => WireValue::TimestampValue(timestamp.to_rfc3339()?),
        ValueKind::String(value) => WireValue::StringValue(value.clone()),
        ValueKind::Bytes(bytes) => WireValue::BytesValue(bytes.to_base64()),
        ValueKind::Reference(name) => WireValue::ReferenceValue(name.clone()),
        ValueKind::GeoPoint(point) => WireValue::GeoPointValue(WireGeoPoint {
            latitude: point.latitude(),
            longitude: point.longitude(),
        }),
        ValueKind::Array(array) => WireValue::ArrayValue(WireArrayValue {
            values: array
                .values()
                .iter()
                .map(encode_value)
                .collect::<FirestoreResult<Vec<_>>>()?,
        }),
        ValueKind::Map(map) => WireValue::MapValue(WireMapValue {
            fields: encode_fields(map.fields())?,
        }),
        ValueKind::Sentinel(sentinel) => {
            return Err(unsupported_type(format!(
                "{} is a write marker and cannot be encoded as a plain value",
                sentinel.name()
            )))
        }
    })
}

fn decode_fields(
    fields: &BTreeMap<String, WireValue>,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

fn decode_value(value: &WireValue) -> FirestoreResult<FirestoreValue> {
    Ok(match value {
        WireValue::NullValue(()) => FirestoreValue::null(),
        WireValue::BooleanValue(value) => FirestoreValue::from_bool(*value),
        WireValue::IntegerValue(text) => {
            let parsed = text.parse::<i64>().map_err(|err| {
                malformed_wire_value(format!("Invalid integerValue '{text}': {err}"))
            })?;
            FirestoreValue::from_integer(parsed)
        }
        WireValue::DoubleValue(value) => FirestoreValue::from_double(*value),
        WireValue::TimestampValue(text) => {
            FirestoreValue::from_timestamp(Timestamp::parse_rfc3339(text)?)
        }
        WireValue::StringValue(value) => FirestoreValue::from_string(value.clone()),
        WireValue::BytesValue(text) => {
            let bytes = BytesValue::from_base64(text)
                .map_err(|err| malformed_wire_value(format!("Invalid bytesValue: {err}")))?;
            FirestoreValue::from_bytes(bytes)
        }
        WireValue::ReferenceValue(name) => FirestoreValue::from_reference(name.clone()),
        WireValue::GeoPointValue(point) => {
            let point = GeoPoint::new(point.latitude, point.longitude)
                .map_err(|err| malformed_wire_value(err.message().to_string()))?;
            FirestoreValue::from_geo_point(point)
        }
        WireValue::ArrayValue(array) => FirestoreValue::from_array(
            array
                .values
                .iter()
                .map(decode_value)
                .collect::<FirestoreResult<Vec<_>>>()?,
        ),
        WireValue::MapValue(map) => FirestoreValue::from_map(decode_fields(&map.fields)?),
    })
}

fn encode_mask(paths: &[FieldPath]) -> WireDocumentMask {
    WireDocumentMask {
        field_paths: paths.iter().map(FieldPath::canonical_string).collect(),
    }
}

fn encode_precondition(precondition: &Precondition) -> FirestoreResult<WirePrecondition> {
    Ok(match precondition {
        Precondition::Exists(exists) => WirePrecondition {
            exists: Some(*exists),
            update_time: None,
        },
        Precondition::UpdateTime(time) => WirePrecondition {
            exists: None,
            update_time: Some(time.to_rfc3339()?),
        },
    })
}

fn encode_field_transforms(
    transforms: &[FieldTransform],
) -> FirestoreResult<Vec<WireFieldTransform>> {
    transforms
        .iter()
        .map(|transform| {
            let operation = match transform.operation() {
                TransformOperation::ServerTimestamp => {
                    WireTransformOperation::SetToServerValue(REQUEST_TIME.to_string())
                }
                TransformOperation::Increment(operand) => {
                    WireTransformOperation::Increment(encode_value(operand)?)
                }
                TransformOperation::ArrayUnion(elements) => {
                    WireTransformOperation::AppendMissingElements(encode_array(elements)?)
                }
                TransformOperation::ArrayRemove(elements) => {
                    WireTransformOperation::RemoveAllFromArray(encode_array(elements)?)
                }
            };
            Ok(WireFieldTransform {
                field_path: transform.field_path().canonical_string(),
                operation,
            })
        })
        .collect()
}

fn encode_array(elements: &[FirestoreValue]) -> FirestoreResult<WireArrayValue> {
    Ok(WireArrayValue {
        values: elements
            .iter()
            .map(encode_value)
            .collect::<FirestoreResult<Vec<_>>>()?,
    })
}

pub(crate) fn parse_optional_timestamp(value: Option<&str>) -> FirestoreResult<Option<Timestamp>> {
    value.map(Timestamp::parse_rfc3339).transpose()
}
