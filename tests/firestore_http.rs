use std::collections::BTreeMap;
use std::panic;

use firestore_rest_sdk::firestore::{
    DatabaseId, Firestore, FirestoreErrorCode, FirestoreSettings, FirestoreValue, RetrySettings,
    SetOptions,
};
use httpmock::prelude::*;
use serde_json::json;

const BASE: &str = "/v1/projects/demo/databases/(default)";
const DOCS: &str = "projects/demo/databases/(default)/documents";

fn start_server(test: &str) -> Option<MockServer> {
    match panic::catch_unwind(MockServer::start) {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!("Skipping {test}: unable to bind httpmock server.");
            None
        }
    }
}

fn firestore(server: &MockServer) -> Firestore {
    let retry = RetrySettings {
        max_attempts: 1,
        ..RetrySettings::default()
    };
    let settings = FirestoreSettings::new(DatabaseId::default("demo"))
        .with_emulator_host(server.address().to_string())
        .with_retry_settings(retry);
    Firestore::from_settings(settings).unwrap()
}

fn fields(entries: &[(&str, FirestoreValue)]) -> BTreeMap<String, FirestoreValue> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[tokio::test]
async fn merge_set_sends_mask_and_server_timestamp() {
    let Some(server) = start_server("merge_set_sends_mask_and_server_timestamp") else {
        return;
    };
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BASE}/documents:commit"))
            .json_body(json!({
                "writes": [{
                    "update": {
                        "name": format!("{DOCS}/cities/LA"),
                        "fields": { "name": { "stringValue": "Los Angeles" } }
                    },
                    "updateMask": { "fieldPaths": ["name"] },
                    "updateTransforms": [{
                        "fieldPath": "updatedAt",
                        "setToServerValue": "REQUEST_TIME"
                    }]
                }]
            }));
        then.status(200).json_body(json!({ "commitTime": "2024-01-01T00:00:00Z" }));
    });

    let la = firestore(&server).doc("cities/LA").unwrap();
    la.set_with_options(
        &fields(&[
            ("name", FirestoreValue::from("Los Angeles")),
            ("updatedAt", FirestoreValue::server_timestamp()),
        ]),
        SetOptions::merge_all(),
    )
    .await
    .unwrap();
    mock.assert();
}

#[tokio::test]
async fn reads_a_document_and_reports_missing_ones() {
    let Some(server) = start_server("reads_a_document_and_reports_missing_ones") else {
        return;
    };
    let found = server.mock(|when, then| {
        when.method(GET).path(format!("{BASE}/documents/cities/SF"));
        then.status(200).json_body(json!({
            "name": format!("{DOCS}/cities/SF"),
            "fields": {
                "name": { "stringValue": "San Francisco" },
                "location": { "geoPointValue": { "latitude": 37.77, "longitude": -122.41 } },
                "tags": { "arrayValue": { "values": [{ "stringValue": "west" }] } }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-02-01T00:00:00Z"
        }));
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path(format!("{BASE}/documents/cities/XX"));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
        }));
    });

    let firestore = firestore(&server);
    let snapshot = firestore.doc("cities/SF").unwrap().get().await.unwrap();
    assert!(snapshot.exists());
    assert_eq!(
        snapshot.get("name").unwrap().and_then(FirestoreValue::as_str),
        Some("San Francisco")
    );
    assert!(snapshot.update_time().is_some());

    let absent = firestore.doc("cities/XX").unwrap().get().await.unwrap();
    assert!(!absent.exists());

    found.assert();
    missing.assert();
}

#[tokio::test]
async fn limit_to_last_flips_the_request_and_the_results() {
    let Some(server) = start_server("limit_to_last_flips_the_request_and_the_results") else {
        return;
    };
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BASE}/documents:runQuery"))
            .json_body_partial(
                json!({
                    "structuredQuery": {
                        "orderBy": [{
                            "field": { "fieldPath": "population" },
                            "direction": "DESCENDING"
                        }],
                        "limit": 2
                    }
                })
                .to_string(),
            );
        then.status(200).json_body(json!([
            {
                "document": {
                    "name": format!("{DOCS}/cities/TOK"),
                    "fields": { "population": { "integerValue": "37000000" } }
                },
                "readTime": "2024-01-01T00:00:00Z"
            },
            {
                "document": {
                    "name": format!("{DOCS}/cities/DEL"),
                    "fields": { "population": { "integerValue": "32000000" } }
                },
                "readTime": "2024-01-01T00:00:00Z"
            }
        ]));
    });

    let snapshot = firestore(&server)
        .collection("cities")
        .unwrap()
        .query()
        .order_by("population")
        .unwrap()
        .limit_to_last(2)
        .unwrap()
        .get()
        .await
        .unwrap();

    let ids: Vec<&str> = snapshot.documents().iter().map(|doc| doc.id()).collect();
    assert_eq!(ids, vec!["DEL", "TOK"]);
    mock.assert();
}

#[tokio::test]
async fn count_runs_an_aggregation_query() {
    let Some(server) = start_server("count_runs_an_aggregation_query") else {
        return;
    };
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BASE}/documents:runAggregationQuery"))
            .json_body_partial(
                json!({
                    "structuredAggregationQuery": {
                        "aggregations": [{ "alias": "count", "count": {} }]
                    }
                })
                .to_string(),
            );
        then.status(200).json_body(json!([{
            "result": { "aggregateFields": { "count": { "integerValue": "42" } } },
            "readTime": "2024-01-01T00:00:00Z"
        }]));
    });

    let count = firestore(&server)
        .collection("cities")
        .unwrap()
        .query()
        .where_field("capital", "==", true)
        .unwrap()
        .count()
        .await
        .unwrap();
    assert_eq!(count, 42);
    mock.assert();
}

#[tokio::test]
async fn transaction_reads_and_commits_with_its_token() {
    let Some(server) = start_server("transaction_reads_and_commits_with_its_token") else {
        return;
    };
    let begin = server.mock(|when, then| {
        when.method(POST).path(format!("{BASE}/documents:beginTransaction"));
        then.status(200).json_body(json!({ "transaction": "dHgtMQ==" }));
    });
    let read = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BASE}/documents:batchGet"))
            .json_body(json!({
                "documents": [format!("{DOCS}/accounts/alice")],
                "transaction": "dHgtMQ=="
            }));
        then.status(200).json_body(json!([{
            "found": {
                "name": format!("{DOCS}/accounts/alice"),
                "fields": { "balance": { "integerValue": "100" } }
            },
            "readTime": "2024-01-01T00:00:00Z"
        }]));
    });
    let commit = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BASE}/documents:commit"))
            .json_body_partial(json!({ "transaction": "dHgtMQ==" }).to_string());
        then.status(200).json_body(json!({ "commitTime": "2024-01-01T00:00:00Z" }));
    });

    let firestore = firestore(&server);
    let alice = firestore.doc("accounts/alice").unwrap();
    let balance = firestore
        .run_transaction(|tx| {
            let alice = alice.clone();
            async move {
                let snapshot = tx.get(&alice).await?;
                let balance = snapshot
                    .get("balance")?
                    .and_then(FirestoreValue::as_i64)
                    .unwrap_or_default();
                tx.update(&alice, &fields(&[("balance", FirestoreValue::from(balance - 10))]))?;
                Ok(balance - 10)
            }
        })
        .await
        .unwrap();

    assert_eq!(balance, 90);
    begin.assert();
    read.assert();
    commit.assert();
}

#[tokio::test]
async fn permission_errors_fail_the_transaction() {
    let Some(server) = start_server("permission_errors_fail_the_transaction") else {
        return;
    };
    server.mock(|when, then| {
        when.method(POST).path(format!("{BASE}/documents:beginTransaction"));
        then.status(403).json_body(json!({
            "error": { "code": 403, "message": "Missing permissions", "status": "PERMISSION_DENIED" }
        }));
    });

    let err = firestore(&server)
        .run_transaction(|_tx| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::TransactionFailed);
    assert_eq!(err.http_status(), Some(403));
}
