//! Compiles a [`QueryDefinition`] into `runQuery` / `runAggregationQuery` request bodies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::firestore::api::query::{Bound, FieldFilter, OrderBy, QueryDefinition};
use crate::firestore::constants::COUNT_ALIAS;
use crate::firestore::error::{internal_error, FirestoreResult};
use crate::firestore::remote::serializer::JsonProtoSerializer;
use crate::firestore::remote::wire::{WireDocument, WireValue};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Projection>,
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Projection {
    pub fields: Vec<FieldReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    pub all_descendants: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    FieldFilter(WireFieldFilter),
    CompositeFilter(CompositeFilter),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireFieldFilter {
    pub field: FieldReference,
    pub op: &'static str,
    pub value: WireValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositeFilter {
    pub op: &'static str,
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    pub field: FieldReference,
    pub direction: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cursor {
    pub values: Vec<WireValue>,
    pub before: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

/// One streamed element of a `runQuery` response. Elements without a document
/// only carry progress information.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(default)]
    pub document: Option<WireDocument>,
    #[serde(default)]
    pub read_time: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregationQueryRequest {
    pub structured_aggregation_query: StructuredAggregationQuery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAggregationQuery {
    pub structured_query: StructuredQuery,
    pub aggregations: Vec<Aggregation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Aggregation {
    pub alias: String,
    pub count: CountAggregation,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CountAggregation {}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregationQueryResponse {
    #[serde(default)]
    pub result: Option<AggregationResult>,
    #[serde(default)]
    pub read_time: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    #[serde(default)]
    pub aggregate_fields: BTreeMap<String, WireValue>,
}

/// `documents[/parent]:runQuery`, relative to the database resource.
pub(crate) fn run_query_path(definition: &QueryDefinition) -> String {
    format!("{}:runQuery", definition.parent_path().request_path())
}

pub(crate) fn run_aggregation_query_path(definition: &QueryDefinition) -> String {
    format!(
        "{}:runAggregationQuery",
        definition.parent_path().request_path()
    )
}

pub(crate) fn encode_structured_query(
    serializer: &JsonProtoSerializer,
    definition: &QueryDefinition,
) -> FirestoreResult<StructuredQuery> {
    let select = definition.projection().map(|fields| Projection {
        fields: fields
            .iter()
            .map(|field| FieldReference {
                field_path: field.canonical_string(),
            })
            .collect(),
    });

    Ok(StructuredQuery {
        select,
        from: vec![CollectionSelector {
            collection_id: definition.collection_id().to_string(),
            all_descendants: definition.all_descendants(),
        }],
        filter: encode_filters(serializer, definition.filters())?,
        order_by: definition
            .request_order_by()
            .iter()
            .map(encode_order)
            .collect(),
        start_at: definition
            .request_start_at()
            .map(|bound| encode_cursor(serializer, &bound))
            .transpose()?,
        end_at: definition
            .request_end_at()
            .map(|bound| encode_cursor(serializer, &bound))
            .transpose()?,
        offset: definition.offset(),
        limit: definition.limit(),
    })
}

pub(crate) fn encode_run_query_request(
    serializer: &JsonProtoSerializer,
    definition: &QueryDefinition,
    transaction: Option<String>,
) -> FirestoreResult<RunQueryRequest> {
    Ok(RunQueryRequest {
        structured_query: encode_structured_query(serializer, definition)?,
        transaction,
    })
}

/// Wraps the query into a single `count` aggregation under [`COUNT_ALIAS`].
pub(crate) fn encode_count_request(
    serializer: &JsonProtoSerializer,
    definition: &QueryDefinition,
    transaction: Option<String>,
) -> FirestoreResult<RunAggregationQueryRequest> {
    Ok(RunAggregationQueryRequest {
        structured_aggregation_query: StructuredAggregationQuery {
            structured_query: encode_structured_query(serializer, definition)?,
            aggregations: vec![Aggregation {
                alias: COUNT_ALIAS.to_string(),
                count: CountAggregation::default(),
            }],
        },
        transaction,
    })
}

/// Splits a streamed response into its elements. The REST endpoint answers with
/// a JSON array; a lone object is treated as a single element.
pub(crate) fn parse_stream<T>(response: JsonValue) -> FirestoreResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let items = match response {
        JsonValue::Array(items) => items,
        JsonValue::Null => Vec::new(),
        other => vec![other],
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|err| internal_error(format!("Unexpected Firestore response: {err}")))
        })
        .collect()
}

fn encode_filters(
    serializer: &JsonProtoSerializer,
    filters: &[FieldFilter],
) -> FirestoreResult<Option<Filter>> {
    let mut encoded = filters
        .iter()
        .map(|filter| encode_field_filter(serializer, filter))
        .collect::<FirestoreResult<Vec<_>>>()?;
    Ok(match encoded.len() {
        0 => None,
        1 => encoded.pop(),
        _ => Some(Filter::CompositeFilter(CompositeFilter {
            op: "AND",
            filters: encoded,
        })),
    })
}

fn encode_field_filter(
    serializer: &JsonProtoSerializer,
    filter: &FieldFilter,
) -> FirestoreResult<Filter> {
    Ok(Filter::FieldFilter(WireFieldFilter {
        field: FieldReference {
            field_path: filter.field().canonical_string(),
        },
        op: filter.operator().as_str(),
        value: serializer.encode_value(filter.value())?,
    }))
}

fn encode_order(order: &OrderBy) -> Order {
    Order {
        field: FieldReference {
            field_path: order.field().canonical_string(),
        },
        direction: order.direction().as_str(),
    }
}

fn encode_cursor(serializer: &JsonProtoSerializer, bound: &Bound) -> FirestoreResult<Cursor> {
    Ok(Cursor {
        values: bound
            .values()
            .iter()
            .map(|value| serializer.encode_value(value))
            .collect::<FirestoreResult<Vec<_>>>()?,
        before: bound.before(),
    })
}
