use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::firestore::api::operations::{compile_set, compile_update, SetOptions};
use crate::firestore::api::query::{Query, QuerySnapshot};
use crate::firestore::api::{DocumentReference, DocumentSnapshot, Firestore};
use crate::firestore::constants::DEFAULT_TRANSACTION_ATTEMPTS;
use crate::firestore::error::{
    internal_error, invalid_argument, transaction_failed, FirestoreError, FirestoreResult,
};
use crate::firestore::remote::datastore::{TransactionId, WriteOperation};
use crate::firestore::value::FirestoreValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Attempts made before a contention error is surfaced. Must be at least 1.
    pub max_attempts: usize,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }
}

impl TransactionOptions {
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    fn validate(&self) -> FirestoreResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid_argument("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    writes: Vec<WriteOperation>,
    finished: bool,
}

/// Handle given to a transaction callback for one attempt.
///
/// Reads go to the backend under the attempt's transaction token. Writes are
/// buffered and sent with the commit. Once the attempt is over every method fails
/// with `InvalidArgument`.
#[derive(Clone, Debug)]
pub struct Transaction {
    firestore: Firestore,
    id: TransactionId,
    state: Arc<Mutex<TransactionState>>,
}

impl Transaction {
    fn new(firestore: Firestore, id: TransactionId) -> Self {
        Self {
            firestore,
            id,
            state: Arc::new(Mutex::new(TransactionState::default())),
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub async fn get(&self, reference: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
        let mut snapshots = self.get_all(std::slice::from_ref(reference)).await?;
        snapshots
            .pop()
            .ok_or_else(|| internal_error("batchGet returned no snapshot for the requested document"))
    }

    /// Reads several documents from one consistent snapshot. Results follow `references` order.
    pub async fn get_all(
        &self,
        references: &[DocumentReference],
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.ensure_active()?;
        let keys: Vec<_> = references
            .iter()
            .map(|reference| reference.key().clone())
            .collect();
        self.firestore
            .datastore()
            .batch_get_documents(&keys, Some(&self.id))
            .await
    }

    pub async fn get_query(&self, query: &Query) -> FirestoreResult<QuerySnapshot> {
        self.ensure_active()?;
        query.execute(Some(&self.id)).await
    }

    pub fn set(
        &self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&Self> {
        self.set_with_options(reference, data, SetOptions::default())
    }

    pub fn set_with_options(
        &self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<&Self> {
        let write = compile_set(reference.key().clone(), data, &options)?;
        self.push(write)
    }

    pub fn update(
        &self,
        reference: &DocumentReference,
        data: &BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&Self> {
        let write = compile_update(reference.key().clone(), data)?;
        self.push(write)
    }

    pub fn delete(&self, reference: &DocumentReference) -> FirestoreResult<&Self> {
        self.push(WriteOperation::Delete {
            key: reference.key().clone(),
        })
    }

    fn push(&self, write: WriteOperation) -> FirestoreResult<&Self> {
        let mut state = self.lock();
        if state.finished {
            return Err(finished_error());
        }
        state.writes.push(write);
        Ok(self)
    }

    fn ensure_active(&self) -> FirestoreResult<()> {
        if self.lock().finished {
            return Err(finished_error());
        }
        Ok(())
    }

    /// Closes the handle and hands back the buffered writes.
    fn finish(&self) -> Vec<WriteOperation> {
        let mut state = self.lock();
        state.finished = true;
        std::mem::take(&mut state.writes)
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn finished_error() -> FirestoreError {
    invalid_argument("Transaction handle used after its attempt has finished")
}

/// Runs `update` inside a read-write transaction, retrying on contention.
///
/// The callback is invoked once per attempt, so it may run more than once and
/// should not have side effects beyond the reads and writes it performs through
/// the handle.
pub(crate) async fn run_transaction<F, Fut, T>(
    firestore: &Firestore,
    options: TransactionOptions,
    mut update: F,
) -> FirestoreResult<T>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = FirestoreResult<T>>,
{
    options.validate()?;
    let datastore = firestore.datastore();
    let mut retry_of: Option<TransactionId> = None;
    let mut last_error: Option<FirestoreError> = None;

    for attempt in 1..=options.max_attempts {
        let id = match datastore.begin_transaction(retry_of.as_ref()).await {
            Ok(id) => id,
            Err(err) if err.is_contention() => {
                log::warn!(
                    "beginTransaction aborted on attempt {attempt}/{}: {err}",
                    options.max_attempts
                );
                last_error = Some(err);
                continue;
            }
            Err(err) => return Err(transaction_failed(err)),
        };
        log::debug!(
            "transaction {id} started (attempt {attempt}/{})",
            options.max_attempts
        );

        let transaction = Transaction::new(firestore.clone(), id.clone());
        let outcome = update(transaction.clone()).await;
        let writes = transaction.finish();

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback_err) = datastore.rollback(&id).await {
                    log::warn!("rollback of transaction {id} failed: {rollback_err}");
                }
                if !err.is_contention() {
                    return Err(err);
                }
                log::warn!(
                    "transaction {id} read aborted on attempt {attempt}/{}: {err}",
                    options.max_attempts
                );
                retry_of = Some(id);
                last_error = Some(err);
                continue;
            }
        };

        log::debug!("committing transaction {id} with {} write(s)", writes.len());
        match datastore.commit(writes, Some(&id)).await {
            Ok(()) => return Ok(value),
            Err(err) if err.is_contention() => {
                log::warn!(
                    "transaction {id} aborted on attempt {attempt}/{}: {err}",
                    options.max_attempts
                );
                retry_of = Some(id);
                last_error = Some(err);
            }
            Err(err) => return Err(transaction_failed(err)),
        }
    }

    Err(last_error.unwrap_or_else(|| internal_error("Transaction made no attempts")))
}
