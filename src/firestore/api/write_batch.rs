use std::collections::BTreeMap;

use crate::firestore::api::operations::{compile_set, compile_update, SetOptions};
use crate::firestore::api::Firestore;
use crate::firestore::constants::MAX_BATCH_WRITES;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::remote::datastore::WriteOperation;
use crate::firestore::value::FirestoreValue;

use super::reference::DocumentReference;

/// Queues writes locally and commits them atomically, in order, with one request.
#[derive(Clone, Debug)]
pub struct WriteBatch {
    firestore: Firestore,
    writes: Vec<WriteOperation>,
}

impl WriteBatch {
    pub(crate) fn new(firestore: Firestore) -> Self {
        Self {
            firestore,
            writes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn set(
        &mut self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.set_with_options(reference, data, SetOptions::default())
    }

    pub fn set_with_options(
        &mut self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_can_add(reference)?;
        let write = compile_set(reference.key().clone(), data, &options)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn update(
        &mut self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_can_add(reference)?;
        let write = compile_update(reference.key().clone(), data)?;
        self.writes.push(write);
        Ok(self)
    }

    pub fn delete(&mut self, reference: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.ensure_can_add(reference)?;
        self.writes.push(WriteOperation::Delete {
            key: reference.key().clone(),
        });
        Ok(self)
    }

    pub async fn commit(self) -> FirestoreResult<()> {
        self.firestore.datastore().commit(self.writes, None).await
    }

    fn ensure_can_add(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        if self.firestore.database_id() != reference.firestore().database_id() {
            return Err(invalid_argument(
                "All WriteBatch operations must target the same Firestore database",
            ));
        }
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(invalid_argument(format!(
                "WriteBatch cannot contain more than {MAX_BATCH_WRITES} operations"
            )));
        }
        Ok(())
    }
}
