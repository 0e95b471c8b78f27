use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::firestore::api::operations::FieldTransform;
use crate::firestore::api::query::QueryDefinition;
use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath, Timestamp};
use crate::firestore::remote::connection::RequestContext;
use crate::firestore::value::MapValue;

pub mod http;

/// Opaque token identifying a server-side transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Condition the backend checks before applying a write.
#[derive(Clone, Debug, PartialEq)]
pub enum Precondition {
    Exists(bool),
    UpdateTime(Timestamp),
}

/// A single compiled write, ready to be encoded into a commit.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Writes `fields`. Without a mask the whole document is replaced; with one only
    /// the masked paths are touched. Transforms run after the field update.
    Upsert {
        key: DocumentKey,
        fields: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
        precondition: Option<Precondition>,
    },
    Delete {
        key: DocumentKey,
    },
    /// Applies transforms without touching any other field.
    TransformOnly {
        key: DocumentKey,
        transforms: Vec<FieldTransform>,
        precondition: Option<Precondition>,
    },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Upsert { key, .. }
            | WriteOperation::Delete { key }
            | WriteOperation::TransformOnly { key, .. } => key,
        }
    }
}

/// Request/response seam between the public API and the backend.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    /// Reads one document outside any transaction. A missing document is a
    /// snapshot whose `exists()` is false.
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot>;

    /// Reads several documents, optionally inside a transaction. Results follow `keys` order.
    async fn batch_get_documents(
        &self,
        keys: &[DocumentKey],
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>>;

    async fn run_query(
        &self,
        query: &QueryDefinition,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>>;

    async fn run_count(
        &self,
        query: &QueryDefinition,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<i64>;

    /// Applies `writes` atomically, in order.
    async fn commit(
        &self,
        writes: Vec<WriteOperation>,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<()>;

    async fn begin_transaction(
        &self,
        retry_of: Option<&TransactionId>,
    ) -> FirestoreResult<TransactionId>;

    async fn rollback(&self, transaction: &TransactionId) -> FirestoreResult<()>;
}

/// Performs one JSON request relative to the database resource path.
///
/// Non-2xx responses must surface as errors carrying the HTTP status and body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> FirestoreResult<Option<String>>;
    fn invalidate_token(&self);
}

/// Sends requests without credentials, as the emulator expects.
#[derive(Default, Clone)]
pub struct NoopTokenProvider;

#[async_trait]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(None)
    }

    fn invalidate_token(&self) {}
}

/// Always returns the same bearer token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(Some(self.token.clone()))
    }

    fn invalidate_token(&self) {}
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;
pub type TransportArc = Arc<dyn Transport>;

pub use http::{HttpDatastore, HttpDatastoreBuilder, RetrySettings};
