use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, IntoFieldPath, Timestamp};
use crate::firestore::value::{from_firestore_map, FirestoreValue, MapValue};

use super::reference::DocumentReference;
use super::Firestore;

/// The state of one document at read time. A missing document has no data.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    create_time: Option<Timestamp>,
    update_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: Option<MapValue>) -> Self {
        Self {
            key,
            data,
            create_time: None,
            update_time: None,
        }
    }

    pub fn missing(key: DocumentKey) -> Self {
        Self::new(key, None)
    }

    pub(crate) fn with_times(
        mut self,
        create_time: Option<Timestamp>,
        update_time: Option<Timestamp>,
    ) -> Self {
        self.create_time = create_time;
        self.update_time = update_time;
        self
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Decoded document fields, or `None` when the document does not exist.
    pub fn data(&self) -> Option<&BTreeMap<String, FirestoreValue>> {
        self.data.as_ref().map(|map| map.fields())
    }

    pub fn into_data(self) -> Option<MapValue> {
        self.data
    }

    /// Value at `field` (a dotted path or a [`FieldPath`](crate::firestore::model::FieldPath)).
    pub fn get<P: IntoFieldPath>(&self, field: P) -> FirestoreResult<Option<&FirestoreValue>> {
        let path = field.into_field_path()?;
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let mut segments = path.segments().iter();
        let mut current = match segments.next().and_then(|first| data.get(first)) {
            Some(value) => value,
            None => return Ok(None),
        };
        for segment in segments {
            current = match current.as_map().and_then(|map| map.get(segment)) {
                Some(value) => value,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    /// Deserializes the document into `T` through serde. `None` for a missing document.
    pub fn data_as<T: DeserializeOwned>(&self) -> FirestoreResult<Option<T>> {
        self.data
            .as_ref()
            .map(|map| from_firestore_map(map.fields()))
            .transpose()
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }

    pub fn reference(&self, firestore: &Firestore) -> DocumentReference {
        DocumentReference::from_key(firestore.clone(), self.key.clone())
    }
}
