use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::firestore::constants::AUTO_ID_LENGTH;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::operations::{compile_create, compile_set, compile_update, SetOptions};
use super::query::Query;
use super::snapshot::DocumentSnapshot;
use crate::firestore::remote::datastore::WriteOperation;

#[derive(Clone, Debug)]
pub struct CollectionReference {
    firestore: Firestore,
    path: ResourcePath,
}

impl CollectionReference {
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        if path.len() % 2 == 0 {
            return Err(invalid_argument(
                "Collection references must point to a collection (odd number of segments)",
            ));
        }
        Ok(Self { firestore, path })
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// Full path of the collection, e.g. `rooms/eros/messages`.
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// The document containing this collection, or `None` for a root collection.
    pub fn parent(&self) -> Option<DocumentReference> {
        if self.path.len() < 3 {
            return None;
        }
        DocumentKey::from_path(self.path.without_last())
            .ok()
            .map(|key| DocumentReference::from_key(self.firestore.clone(), key))
    }

    /// Reference to `document_id` in this collection, or to a fresh 20-character
    /// auto-generated id when `document_id` is `None`.
    pub fn doc(&self, document_id: Option<&str>) -> FirestoreResult<DocumentReference> {
        let id = match document_id {
            Some(id) => id.to_string(),
            None => generate_auto_id(),
        };
        if id.is_empty() || id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid document ID '{id}': it must be non-empty and cannot contain '/'"
            )));
        }
        let key = DocumentKey::from_path(self.path.child([id]))?;
        Ok(DocumentReference::from_key(self.firestore.clone(), key))
    }

    /// Creates a document with an auto-generated id. Fails if that id is already taken.
    pub async fn add(
        &self,
        data: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<DocumentReference> {
        let reference = self.doc(None)?;
        reference.create(data).await?;
        Ok(reference)
    }

    /// Query over every document of this collection.
    pub fn query(&self) -> Query {
        Query::new(
            self.firestore.clone(),
            self.path.without_last(),
            self.id().to_string(),
            false,
        )
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path.canonical_string())
    }
}

#[derive(Clone, Debug)]
pub struct DocumentReference {
    firestore: Firestore,
    key: DocumentKey,
}

impl DocumentReference {
    pub(crate) fn new(firestore: Firestore, path: ResourcePath) -> FirestoreResult<Self> {
        let key = DocumentKey::from_path(path)?;
        Ok(Self::from_key(firestore, key))
    }

    pub(crate) fn from_key(firestore: Firestore, key: DocumentKey) -> Self {
        Self { firestore, key }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn path(&self) -> &ResourcePath {
        self.key.path()
    }

    /// `projects/{p}/databases/{d}/documents/{path}`, the form stored in `referenceValue`.
    pub fn resource_name(&self) -> String {
        format!(
            "{}/documents/{}",
            self.firestore.database_id().resource_name(),
            self.key.path().canonical_string()
        )
    }

    pub fn parent(&self) -> CollectionReference {
        CollectionReference {
            firestore: self.firestore.clone(),
            path: self.key.collection_path(),
        }
    }

    /// Subcollection at `path`, relative to this document.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let relative = ResourcePath::from_string(path)?;
        let full_path = self.key.path().child(relative.iter().cloned());
        CollectionReference::new(self.firestore.clone(), full_path)
    }

    /// Reads the document. A missing document yields a snapshot with `exists() == false`.
    pub async fn get(&self) -> FirestoreResult<DocumentSnapshot> {
        self.firestore.datastore().get_document(&self.key).await
    }

    /// Replaces the document with `data`, creating it if needed.
    pub async fn set(&self, data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        self.set_with_options(data, SetOptions::default()).await
    }

    /// `set` with merge semantics controlled by `options`.
    pub async fn set_with_options(
        &self,
        data: &BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<()> {
        let write = compile_set(self.key.clone(), data, &options)?;
        self.commit(write).await
    }

    /// Writes `data` only if the document does not exist yet.
    pub async fn create(&self, data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        let write = compile_create(self.key.clone(), data)?;
        self.commit(write).await
    }

    /// Updates the given fields of an existing document. Keys may be dotted paths.
    pub async fn update(&self, data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        let write = compile_update(self.key.clone(), data)?;
        self.commit(write).await
    }

    pub async fn delete(&self) -> FirestoreResult<()> {
        self.commit(WriteOperation::Delete {
            key: self.key.clone(),
        })
        .await
    }

    async fn commit(&self, write: WriteOperation) -> FirestoreResult<()> {
        self.firestore.datastore().commit(vec![write], None).await
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DocumentReference({})",
            self.key.path().canonical_string()
        )
    }
}

impl From<&DocumentReference> for FirestoreValue {
    fn from(reference: &DocumentReference) -> Self {
        FirestoreValue::from_reference(reference.resource_name())
    }
}

impl From<DocumentReference> for FirestoreValue {
    fn from(reference: DocumentReference) -> Self {
        FirestoreValue::from(&reference)
    }
}

fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}
