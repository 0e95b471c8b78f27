use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::firestore::constants::{
    DATABASE_ID_ENV, DEFAULT_DATABASE_ID, EMULATOR_HOST_ENV, GCP_PROJECT_ID_ENV, PROJECT_ID_ENV,
};
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DatabaseId, ResourcePath};
use crate::firestore::remote::datastore::{
    Datastore, HttpDatastore, NoopTokenProvider, RetrySettings, TokenProviderArc, Transport,
};
use crate::firestore::remote::Connection;

use super::query::Query;
use super::reference::{CollectionReference, DocumentReference};
use super::transaction::{run_transaction, Transaction, TransactionOptions};
use super::write_batch::WriteBatch;

/// Client configuration: which database to talk to and how.
#[derive(Clone)]
pub struct FirestoreSettings {
    pub database_id: DatabaseId,
    /// `host:port` of a local emulator. Requests then go over plain HTTP.
    pub emulator_host: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetrySettings,
    pub auth_provider: TokenProviderArc,
}

impl FirestoreSettings {
    /// Settings for `database_id`. The emulator host is taken from
    /// `FIRESTORE_EMULATOR_HOST` when that variable is set.
    pub fn new(database_id: DatabaseId) -> Self {
        let retry = RetrySettings::default();
        Self {
            database_id,
            emulator_host: read_env(EMULATOR_HOST_ENV),
            request_timeout: retry.request_timeout,
            retry,
            auth_provider: Arc::new(NoopTokenProvider),
        }
    }

    /// Reads `FIRESTORE_PROJECT_ID` (or `GCP_PROJECT_ID`), `FIRESTORE_DATABASE_ID`
    /// and `FIRESTORE_EMULATOR_HOST`.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = read_env(PROJECT_ID_ENV)
            .or_else(|| read_env(GCP_PROJECT_ID_ENV))
            .ok_or_else(|| {
                invalid_argument(format!(
                    "Set {PROJECT_ID_ENV} or {GCP_PROJECT_ID_ENV} to the Google Cloud project id"
                ))
            })?;
        let database = read_env(DATABASE_ID_ENV).unwrap_or_else(|| DEFAULT_DATABASE_ID.to_string());
        Ok(Self::new(DatabaseId::new(project_id, database)))
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }
}

impl Debug for FirestoreSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreSettings")
            .field("database_id", &self.database_id)
            .field("emulator_host", &self.emulator_host)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Entry point to one Firestore database. Cheap to clone.
#[derive(Clone)]
pub struct Firestore {
    inner: Arc<FirestoreInner>,
}

struct FirestoreInner {
    database_id: DatabaseId,
    datastore: Arc<dyn Datastore>,
}

impl Firestore {
    /// Client for `database_id` over HTTPS, or the emulator named by
    /// `FIRESTORE_EMULATOR_HOST` (read by [`FirestoreSettings::new`]), without credentials.
    pub fn new(database_id: DatabaseId) -> FirestoreResult<Self> {
        Self::from_settings(FirestoreSettings::new(database_id))
    }

    pub fn from_env() -> FirestoreResult<Self> {
        Self::from_settings(FirestoreSettings::from_env()?)
    }

    pub fn from_settings(settings: FirestoreSettings) -> FirestoreResult<Self> {
        let mut connection = Connection::builder(settings.database_id.clone());
        if let Some(host) = settings.emulator_host.as_deref() {
            connection = connection.with_emulator_host(host);
        }
        let datastore = HttpDatastore::builder(settings.database_id.clone())
            .with_connection_builder(connection)
            .with_auth_provider(settings.auth_provider)
            .with_retry_settings(settings.retry)
            .with_request_timeout(settings.request_timeout)
            .build()?;
        Ok(Self::with_datastore(settings.database_id, Arc::new(datastore)))
    }

    /// Client that sends every request through `transport`.
    pub fn with_transport(database_id: DatabaseId, transport: impl Transport) -> Self {
        let datastore = HttpDatastore::with_transport(database_id.clone(), Arc::new(transport));
        Self::with_datastore(database_id, Arc::new(datastore))
    }

    pub fn with_datastore(database_id: DatabaseId, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            inner: Arc::new(FirestoreInner {
                database_id,
                datastore,
            }),
        }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    pub fn project_id(&self) -> &str {
        self.inner.database_id.project_id()
    }

    /// Logical database name, usually `"(default)"`.
    pub fn database(&self) -> &str {
        self.inner.database_id.database()
    }

    pub(crate) fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.inner.datastore
    }

    /// Collection at `path`, e.g. `"users/alovelace/repos"`.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let resource = ResourcePath::from_string(path)?;
        CollectionReference::new(self.clone(), resource)
    }

    /// Document at `path`; the path must have an even number of segments.
    pub fn doc(&self, path: &str) -> FirestoreResult<DocumentReference> {
        let resource = ResourcePath::from_string(path)?;
        DocumentReference::new(self.clone(), resource)
    }

    /// Query over every collection named `collection_id`, whatever its parent.
    pub fn collection_group(&self, collection_id: &str) -> FirestoreResult<Query> {
        if collection_id.is_empty() || collection_id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid collection id '{collection_id}' for a collection group query"
            )));
        }
        Ok(Query::new(
            self.clone(),
            ResourcePath::root(),
            collection_id.to_string(),
            true,
        ))
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Runs `update` in a transaction with the default options (5 attempts).
    ///
    /// `update` is called again from scratch whenever the commit is aborted by a
    /// conflicting write.
    pub async fn run_transaction<F, Fut, T>(&self, update: F) -> FirestoreResult<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        run_transaction(self, TransactionOptions::default(), update).await
    }

    pub async fn run_transaction_with_options<F, Fut, T>(
        &self,
        options: TransactionOptions,
        update: F,
    ) -> FirestoreResult<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        run_transaction(self, options, update).await
    }
}

impl Debug for Firestore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firestore")
            .field("database_id", &self.inner.database_id)
            .finish_non_exhaustive()
    }
}
