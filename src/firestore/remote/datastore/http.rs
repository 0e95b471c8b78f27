use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::firestore::api::query::QueryDefinition;
use crate::firestore::api::DocumentSnapshot;
use crate::firestore::constants::COUNT_ALIAS;
use crate::firestore::error::{internal_error, FirestoreError, FirestoreErrorCode, FirestoreResult};
use crate::firestore::model::{DatabaseId, DocumentKey};
use crate::firestore::remote::connection::{Connection, ConnectionBuilder, RequestContext};
use crate::firestore::remote::serializer::JsonProtoSerializer;
use crate::firestore::remote::structured_query::{
    encode_count_request, encode_run_query_request, parse_stream, run_aggregation_query_path,
    run_query_path, RunAggregationQueryResponse, RunQueryResponse,
};
use crate::firestore::remote::wire::{
    BatchGetDocumentsRequest, BatchGetDocumentsResponse, BeginTransactionRequest,
    BeginTransactionResponse, CommitRequest, RollbackRequest, WireDocument, WireReadWrite,
    WireTransactionOptions,
};
use crate::platform::runtime::sleep as runtime_sleep;

use super::{
    Datastore, NoopTokenProvider, TokenProviderArc, TransactionId, TransportArc, WriteOperation,
};

/// [`Datastore`] speaking the Firestore v1 REST API through a [`Transport`](super::Transport).
#[derive(Clone)]
pub struct HttpDatastore {
    transport: TransportArc,
    serializer: JsonProtoSerializer,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
}

#[derive(Clone)]
pub struct HttpDatastoreBuilder {
    database_id: DatabaseId,
    connection_builder: ConnectionBuilder,
    transport: Option<TransportArc>,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
}

/// Backoff applied to transient transport failures of a single request.
///
/// Contention is never retried here; transactions handle it at a higher level.
#[derive(Clone, Debug)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl HttpDatastore {
    pub fn builder(database_id: DatabaseId) -> HttpDatastoreBuilder {
        HttpDatastoreBuilder::new(database_id)
    }

    pub fn from_database_id(database_id: DatabaseId) -> FirestoreResult<Self> {
        Self::builder(database_id).build()
    }

    /// Datastore over a caller-supplied transport, without credentials and with default retries.
    pub fn with_transport(database_id: DatabaseId, transport: TransportArc) -> Self {
        Self {
            transport,
            serializer: JsonProtoSerializer::new(database_id),
            auth_provider: Arc::new(NoopTokenProvider),
            retry: RetrySettings::default(),
        }
    }

    pub fn serializer(&self) -> &JsonProtoSerializer {
        &self.serializer
    }

    async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> FirestoreResult<T>
    where
        F: FnMut(RequestContext) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            let context = self.build_request_context().await?;
            match operation(context).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !self.retry.should_retry(attempt, &err) {
                        return Err(err);
                    }

                    if err.code == FirestoreErrorCode::Unauthenticated {
                        self.auth_provider.invalidate_token();
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    log::warn!(
                        "firestore request failed on attempt {}: {err}; retrying in {delay:?}",
                        attempt + 1
                    );
                    runtime_sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn build_request_context(&self) -> FirestoreResult<RequestContext> {
        let auth_token = self.auth_provider.get_token().await?;
        Ok(RequestContext {
            auth_token,
            request_timeout: Some(self.retry.request_timeout),
        })
    }

    async fn invoke(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> FirestoreResult<JsonValue> {
        log::debug!("firestore {method} {path}");
        self.execute_with_retry(|context| {
            let method = method.clone();
            let body = body.clone();
            async move { self.transport.send(method, path, body, &context).await }
        })
        .await
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> FirestoreResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let response = self.invoke(Method::POST, path, Some(to_body(body)?)).await?;
        from_response(response)
    }

    fn decode_documents(&self, responses: Vec<RunQueryResponse>) -> FirestoreResult<Vec<DocumentSnapshot>> {
        responses
            .into_iter()
            .filter_map(|response| response.document)
            .map(|document| self.serializer.decode_document(&document))
            .collect()
    }
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        let result = self.invoke(Method::GET, &key.request_path(), None).await;
        match result {
            Ok(response) => {
                let document: WireDocument = from_response(response)?;
                self.serializer.decode_document(&document)
            }
            Err(err) if is_missing_document(&err) => Ok(DocumentSnapshot::missing(key.clone())),
            Err(err) => Err(err),
        }
    }

    async fn batch_get_documents(
        &self,
        keys: &[DocumentKey],
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchGetDocumentsRequest {
            documents: keys
                .iter()
                .map(|key| self.serializer.document_name(key))
                .collect(),
            transaction: transaction.map(|id| id.as_str().to_string()),
        };
        let response = self
            .invoke(Method::POST, "documents:batchGet", Some(to_body(&request)?))
            .await?;

        let mut results: HashMap<DocumentKey, DocumentSnapshot> = HashMap::new();
        for entry in parse_stream::<BatchGetDocumentsResponse>(response)? {
            if let Some(document) = entry.found {
                let snapshot = self.serializer.decode_document(&document)?;
                results.insert(snapshot.key().clone(), snapshot);
            } else if let Some(name) = entry.missing {
                let key = self.serializer.parse_document_name(&name)?;
                results.insert(key.clone(), DocumentSnapshot::missing(key));
            }
        }

        keys.iter()
            .map(|key| {
                results.get(key).cloned().ok_or_else(|| {
                    internal_error(format!(
                        "batchGet response did not include document '{}'",
                        key.path()
                    ))
                })
            })
            .collect()
    }

    async fn run_query(
        &self,
        query: &QueryDefinition,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let request = encode_run_query_request(
            &self.serializer,
            query,
            transaction.map(|id| id.as_str().to_string()),
        )?;
        let response = self
            .invoke(Method::POST, &run_query_path(query), Some(to_body(&request)?))
            .await?;
        self.decode_documents(parse_stream(response)?)
    }

    async fn run_count(
        &self,
        query: &QueryDefinition,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<i64> {
        let request = encode_count_request(
            &self.serializer,
            query,
            transaction.map(|id| id.as_str().to_string()),
        )?;
        let response = self
            .invoke(
                Method::POST,
                &run_aggregation_query_path(query),
                Some(to_body(&request)?),
            )
            .await?;

        let result = parse_stream::<RunAggregationQueryResponse>(response)?
            .into_iter()
            .find_map(|entry| entry.result)
            .ok_or_else(|| internal_error("runAggregationQuery returned no result"))?;
        let value = result
            .aggregate_fields
            .get(COUNT_ALIAS)
            .ok_or_else(|| internal_error("runAggregationQuery result is missing the count"))?;
        self.serializer
            .decode_value(value)?
            .as_i64()
            .ok_or_else(|| internal_error("runAggregationQuery count is not an integer"))
    }

    async fn commit(
        &self,
        writes: Vec<WriteOperation>,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<()> {
        if writes.is_empty() && transaction.is_none() {
            return Ok(());
        }

        let request = CommitRequest {
            writes: writes
                .iter()
                .map(|write| self.serializer.encode_write(write))
                .collect::<FirestoreResult<Vec<_>>>()?,
            transaction: transaction.map(|id| id.as_str().to_string()),
        };
        log::debug!(
            "committing {} write(s){}",
            request.writes.len(),
            if transaction.is_some() { " in transaction" } else { "" }
        );
        self.invoke(Method::POST, "documents:commit", Some(to_body(&request)?))
            .await
            .map(|_| ())
    }

    async fn begin_transaction(
        &self,
        retry_of: Option<&TransactionId>,
    ) -> FirestoreResult<TransactionId> {
        let request = BeginTransactionRequest {
            options: WireTransactionOptions {
                read_write: WireReadWrite {
                    retry_transaction: retry_of.map(|id| id.as_str().to_string()),
                },
            },
        };
        let response: BeginTransactionResponse =
            self.post("documents:beginTransaction", &request).await?;
        Ok(TransactionId::new(response.transaction))
    }

    async fn rollback(&self, transaction: &TransactionId) -> FirestoreResult<()> {
        let request = RollbackRequest {
            transaction: transaction.as_str().to_string(),
        };
        self.invoke(Method::POST, "documents:rollback", Some(to_body(&request)?))
            .await
            .map(|_| ())
    }
}

impl HttpDatastoreBuilder {
    fn new(database_id: DatabaseId) -> Self {
        let auth_provider: TokenProviderArc = Arc::new(NoopTokenProvider);
        let connection_builder = Connection::builder(database_id.clone());
        Self {
            database_id,
            connection_builder,
            transport: None,
            auth_provider,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_retry_settings(mut self, settings: RetrySettings) -> Self {
        self.retry = settings;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.retry.request_timeout = timeout;
        self
    }

    pub fn with_connection_builder(mut self, builder: ConnectionBuilder) -> Self {
        self.connection_builder = builder;
        self
    }

    /// Replaces the `reqwest` connection with a custom transport.
    pub fn with_transport(mut self, transport: TransportArc) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> FirestoreResult<HttpDatastore> {
        let transport: TransportArc = match self.transport {
            Some(transport) => transport,
            None => Arc::new(self.connection_builder.build()?),
        };
        Ok(HttpDatastore {
            transport,
            serializer: JsonProtoSerializer::new(self.database_id),
            auth_provider: self.auth_provider,
            retry: self.retry,
        })
    }
}

impl RetrySettings {
    fn should_retry(&self, attempt: usize, error: &FirestoreError) -> bool {
        if attempt + 1 >= self.max_attempts {
            return false;
        }

        matches!(
            error.code,
            FirestoreErrorCode::Internal
                | FirestoreErrorCode::Unavailable
                | FirestoreErrorCode::DeadlineExceeded
                | FirestoreErrorCode::ResourceExhausted
                | FirestoreErrorCode::Unauthenticated
        )
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

fn is_missing_document(err: &FirestoreError) -> bool {
    err.code == FirestoreErrorCode::NotFound && err.http_status() == Some(404)
}

fn to_body<T: Serialize>(value: &T) -> FirestoreResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|err| internal_error(format!("Failed to encode Firestore request: {err}")))
}

fn from_response<T: DeserializeOwned>(response: JsonValue) -> FirestoreResult<T> {
    serde_json::from_value(response)
        .map_err(|err| internal_error(format!("Unexpected Firestore response: {err}")))
}
