use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::firestore::error::{transport_error, FirestoreError, FirestoreResult};
use crate::firestore::remote::datastore::Transport;
use crate::firestore::remote::RequestContext;

/// One request observed by a [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub auth_token: Option<String>,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<FirestoreResult<JsonValue>>,
    requests: Vec<RecordedRequest>,
}

/// In-process [`Transport`] that replays queued responses in order and records every request.
///
/// Clones share the same script, so a test can keep a handle after passing one to a datastore.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, response: JsonValue) {
        self.lock().responses.push_back(Ok(response));
    }

    pub fn push_err(&self, error: FirestoreError) {
        self.lock().responses.push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests whose path ends with `suffix` (`":commit"`, `":batchGet"`, ...).
    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path.ends_with(suffix))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body,
            auth_token: context.auth_token.clone(),
        });
        state.responses.pop_front().unwrap_or_else(|| {
            Err(transport_error(format!(
                "no scripted response left for {method} {path}"
            )))
        })
    }
}
