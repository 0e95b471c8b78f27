use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value as JsonValue;

use crate::firestore::constants::{FIRESTORE_API_HOST, FIRESTORE_API_VERSION};
use crate::firestore::error::{
    deadline_exceeded, internal_error, transport_error, unavailable, FirestoreError,
    FirestoreResult,
};
use crate::firestore::model::DatabaseId;

use super::datastore::Transport;
use super::rpc_error::map_http_error;

/// `reqwest`-backed [`Transport`] bound to one database.
#[derive(Clone, Debug)]
pub struct Connection {
    client: Client,
    base_url: String,
}

#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    database_id: DatabaseId,
    client: Option<Client>,
    emulator_host: Option<String>,
}

/// Per-request values resolved before each attempt.
#[derive(Default, Clone, Debug)]
pub struct RequestContext {
    pub auth_token: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(database_id: DatabaseId) -> Self {
        Self {
            database_id,
            client: None,
            emulator_host: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Targets a plain-HTTP emulator at `host` (`localhost:8080`).
    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }

    pub fn build(self) -> FirestoreResult<Connection> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .build()
                .map_err(|err| internal_error(err.to_string()))?,
        };
        let base_url = build_base_url(&self.database_id, self.emulator_host.as_deref());
        Ok(Connection { client, base_url })
    }
}

impl Connection {
    pub fn builder(database_id: DatabaseId) -> ConnectionBuilder {
        ConnectionBuilder::new(database_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        let mut request = self.build_request(method, path, context);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;
        if status.is_success() {
            if text.trim().is_empty() {
                Ok(JsonValue::Null)
            } else {
                serde_json::from_str(&text).map_err(|err| {
                    internal_error(format!("Firestore returned invalid JSON: {err}"))
                        .with_response(status.as_u16(), None)
                })
            }
        } else {
            Err(map_http_error(status, &text))
        }
    }

    fn build_request(&self, method: Method, path: &str, context: &RequestContext) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.client.request(method, url);
        if let Some(timeout) = context.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = context.auth_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl Transport for Connection {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        self.invoke_json(method, path, body, context).await
    }
}

fn map_send_error(err: reqwest::Error) -> FirestoreError {
    if err.is_timeout() {
        deadline_exceeded(err.to_string())
    } else if err.is_connect() {
        unavailable(err.to_string())
    } else {
        transport_error(err.to_string())
    }
}

fn build_base_url(database_id: &DatabaseId, emulator_host: Option<&str>) -> String {
    match emulator_host {
        Some(host) => format!(
            "http://{host}/{FIRESTORE_API_VERSION}/{}",
            database_id.resource_name()
        ),
        None => format!(
            "{FIRESTORE_API_HOST}/{FIRESTORE_API_VERSION}/{}",
            database_id.resource_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::panic;

    #[test]
    fn base_url_targets_production_or_emulator() {
        let database_id = DatabaseId::new("demo", "(default)");
        assert_eq!(
            build_base_url(&database_id, None),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)"
        );
        assert_eq!(
            build_base_url(&database_id, Some("localhost:8080")),
            "http://localhost:8080/v1/projects/demo/databases/(default)"
        );
    }

    #[test]
    fn builder_targets_production_unless_told_otherwise() {
        let connection = Connection::builder(DatabaseId::default("demo")).build().unwrap();
        assert_eq!(
            connection.base_url(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)"
        );
    }

    #[tokio::test]
    async fn sends_bearer_token_and_json_body() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping sends_bearer_token_and_json_body: unable to bind httpmock server.");
                return;
            }
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/demo/databases/(default)/documents:commit")
                .header("authorization", "Bearer secret")
                .json_body(json!({ "writes": [] }));
            then.status(200).json_body(json!({ "commitTime": "2024-01-01T00:00:00Z" }));
        });

        let connection = Connection::builder(DatabaseId::default("demo"))
            .with_emulator_host(server.address().to_string())
            .build()
            .unwrap();
        let context = RequestContext {
            auth_token: Some("secret".into()),
            request_timeout: None,
        };
        let response = connection
            .send(Method::POST, "documents:commit", Some(json!({ "writes": [] })), &context)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response["commitTime"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn surfaces_status_and_body_on_failure() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping surfaces_status_and_body_on_failure: unable to bind httpmock server.");
                return;
            }
        };
        server.mock(|when, then| {
            when.method(GET)
                .path("/v1/projects/demo/databases/(default)/documents/cities/LA");
            then.status(404).json_body(json!({
                "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
            }));
        });

        let connection = Connection::builder(DatabaseId::default("demo"))
            .with_emulator_host(server.address().to_string())
            .build()
            .unwrap();
        let err = connection
            .send(Method::GET, "documents/cities/LA", None, &RequestContext::default())
            .await
            .unwrap_err();

        assert_eq!(err.code, FirestoreErrorCode::NotFound);
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(err.details().unwrap()["error"]["message"], "Document not found");
    }

    #[tokio::test]
    async fn empty_success_body_is_null() {
        let server = match panic::catch_unwind(|| start_mock_server()) {
            Ok(server) => server,
            Err(_) => {
                eprintln!("Skipping empty_success_body_is_null: unable to bind httpmock server.");
                return;
            }
        };
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/demo/databases/(default)/documents:rollback");
            then.status(200);
        });

        let connection = Connection::builder(DatabaseId::default("demo"))
            .with_emulator_host(server.address().to_string())
            .build()
            .unwrap();
        let response = connection
            .send(
                Method::POST,
                "documents:rollback",
                Some(json!({ "transaction": "abc" })),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert!(response.is_null());
    }
}
