use std::str::FromStr;
use std::sync::Arc;

use crate::firestore::api::{DocumentSnapshot, Firestore};
use crate::firestore::error::{invalid_argument, FirestoreError, FirestoreResult};
use crate::firestore::model::{FieldPath, IntoFieldPath, ResourcePath};
use crate::firestore::remote::datastore::TransactionId;
use crate::firestore::value::FirestoreValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Operator name used by the REST API (`LESS_THAN`, `ARRAY_CONTAINS`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = FirestoreError;

    /// Parses the query-language tokens: `<`, `<=`, `>`, `>=`, `==`, `!=`,
    /// `array-contains`, `array-contains-any`, `in`, `not-in`.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "<" => Ok(FilterOperator::LessThan),
            "<=" => Ok(FilterOperator::LessThanOrEqual),
            ">" => Ok(FilterOperator::GreaterThan),
            ">=" => Ok(FilterOperator::GreaterThanOrEqual),
            "==" => Ok(FilterOperator::Equal),
            "!=" => Ok(FilterOperator::NotEqual),
            "array-contains" => Ok(FilterOperator::ArrayContains),
            "array-contains-any" => Ok(FilterOperator::ArrayContainsAny),
            "in" => Ok(FilterOperator::In),
            "not-in" => Ok(FilterOperator::NotIn),
            other => Err(invalid_argument(format!(
                "Invalid query operator '{other}'"
            ))),
        }
    }
}

pub trait IntoFilterOperator {
    fn into_filter_operator(self) -> FirestoreResult<FilterOperator>;
}

impl IntoFilterOperator for FilterOperator {
    fn into_filter_operator(self) -> FirestoreResult<FilterOperator> {
        Ok(self)
    }
}

impl IntoFilterOperator for &str {
    fn into_filter_operator(self) -> FirestoreResult<FilterOperator> {
        self.parse()
    }
}

impl IntoFilterOperator for String {
    fn into_filter_operator(self) -> FirestoreResult<FilterOperator> {
        self.parse()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            OrderDirection::Ascending => OrderDirection::Descending,
            OrderDirection::Descending => OrderDirection::Ascending,
        }
    }
}

impl FromStr for OrderDirection {
    type Err = FirestoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "asc" | "ASC" | "ascending" | "ASCENDING" => Ok(OrderDirection::Ascending),
            "desc" | "DESC" | "descending" | "DESCENDING" => Ok(OrderDirection::Descending),
            other => Err(invalid_argument(format!(
                "Invalid order direction '{other}' (expected \"asc\" or \"desc\")"
            ))),
        }
    }
}

pub trait IntoOrderDirection {
    fn into_order_direction(self) -> FirestoreResult<OrderDirection>;
}

impl IntoOrderDirection for OrderDirection {
    fn into_order_direction(self) -> FirestoreResult<OrderDirection> {
        Ok(self)
    }
}

impl IntoOrderDirection for &str {
    fn into_order_direction(self) -> FirestoreResult<OrderDirection> {
        self.parse()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: FirestoreValue,
}

impl FieldFilter {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    fn reversed(&self) -> Self {
        Self {
            field: self.field.clone(),
            direction: self.direction.reversed(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitType {
    #[default]
    First,
    Last,
}

/// A cursor position. `before` is true when the position sorts just before the
/// given values, i.e. `start_at` and `end_before`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    values: Vec<FirestoreValue>,
    before: bool,
}

impl Bound {
    pub fn new(values: Vec<FirestoreValue>, before: bool) -> Self {
        Self { values, before }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn before(&self) -> bool {
        self.before
    }

    fn inverted(&self) -> Self {
        Self {
            values: self.values.clone(),
            before: !self.before,
        }
    }
}

/// Everything that describes a query independent of the database it runs on.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    parent_path: ResourcePath,
    collection_id: String,
    all_descendants: bool,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<i64>,
    limit_type: LimitType,
    offset: Option<i64>,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
    projection: Option<Vec<FieldPath>>,
}

impl QueryDefinition {
    pub fn new(
        parent_path: ResourcePath,
        collection_id: impl Into<String>,
        all_descendants: bool,
    ) -> Self {
        Self {
            parent_path,
            collection_id: collection_id.into(),
            all_descendants,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            limit_type: LimitType::First,
            offset: None,
            start_at: None,
            end_at: None,
            projection: None,
        }
    }

    /// Path of the document (or the root) the query runs under.
    pub fn parent_path(&self) -> &ResourcePath {
        &self.parent_path
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn all_descendants(&self) -> bool {
        self.all_descendants
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub fn projection(&self) -> Option<&[FieldPath]> {
        self.projection.as_deref()
    }

    pub fn is_limit_to_last(&self) -> bool {
        self.limit_type == LimitType::Last && self.limit.is_some()
    }

    /// Ordering sent to the backend. A limit-to-last query runs in reverse.
    pub(crate) fn request_order_by(&self) -> Vec<OrderBy> {
        if self.is_limit_to_last() {
            self.order_by.iter().map(OrderBy::reversed).collect()
        } else {
            self.order_by.clone()
        }
    }

    pub(crate) fn request_start_at(&self) -> Option<Bound> {
        if self.is_limit_to_last() {
            self.end_at.as_ref().map(Bound::inverted)
        } else {
            self.start_at.clone()
        }
    }

    pub(crate) fn request_end_at(&self) -> Option<Bound> {
        if self.is_limit_to_last() {
            self.start_at.as_ref().map(Bound::inverted)
        } else {
            self.end_at.clone()
        }
    }

    /// Same query without `limit`/`offset`, as used for counting.
    pub(crate) fn without_limits(&self) -> Self {
        let mut definition = self.clone();
        definition.limit = None;
        definition.limit_type = LimitType::First;
        definition.offset = None;
        definition
    }

    pub(crate) fn validate_for_execution(&self) -> FirestoreResult<()> {
        if self.is_limit_to_last() && self.order_by.is_empty() {
            return Err(invalid_argument(
                "limit_to_last() queries require at least one order_by() clause",
            ));
        }
        Ok(())
    }
}

/// Immutable query. Every builder method returns a new `Query`.
#[derive(Clone, Debug)]
pub struct Query {
    firestore: Firestore,
    definition: Arc<QueryDefinition>,
}

impl Query {
    pub(crate) fn new(
        firestore: Firestore,
        parent_path: ResourcePath,
        collection_id: impl Into<String>,
        all_descendants: bool,
    ) -> Self {
        Self {
            firestore,
            definition: Arc::new(QueryDefinition::new(
                parent_path,
                collection_id,
                all_descendants,
            )),
        }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    /// Adds a field filter. `operator` is a [`FilterOperator`] or a token such as `"=="`.
    pub fn where_field<P, O, V>(&self, field: P, operator: O, value: V) -> FirestoreResult<Query>
    where
        P: IntoFieldPath,
        O: IntoFilterOperator,
        V: Into<FirestoreValue>,
    {
        let field = field.into_field_path()?;
        let operator = operator.into_filter_operator()?;
        let value = value.into();
        if value.is_sentinel() {
            return Err(invalid_argument(
                "Write markers cannot be used as query filter values",
            ));
        }
        Ok(self.with_definition(|definition| {
            definition.filters.push(FieldFilter {
                field,
                operator,
                value,
            })
        }))
    }

    /// Orders by `field` ascending.
    pub fn order_by<P>(&self, field: P) -> FirestoreResult<Query>
    where
        P: IntoFieldPath,
    {
        self.order_by_with(field, OrderDirection::Ascending)
    }

    /// Orders by `field` in `direction` (an [`OrderDirection`], `"asc"` or `"desc"`).
    pub fn order_by_with<P, D>(&self, field: P, direction: D) -> FirestoreResult<Query>
    where
        P: IntoFieldPath,
        D: IntoOrderDirection,
    {
        let field = field.into_field_path()?;
        let direction = direction.into_order_direction()?;
        Ok(self.with_definition(|definition| {
            definition.order_by.push(OrderBy { field, direction })
        }))
    }

    /// Keeps the first `limit` results. Replaces any previous `limit_to_last`.
    pub fn limit(&self, limit: i64) -> FirestoreResult<Query> {
        let limit = non_negative("limit", limit)?;
        Ok(self.with_definition(|definition| {
            definition.limit = Some(limit);
            definition.limit_type = LimitType::First;
        }))
    }

    /// Keeps the last `limit` results in the requested order. Requires an `order_by`
    /// clause by the time the query runs.
    pub fn limit_to_last(&self, limit: i64) -> FirestoreResult<Query> {
        let limit = non_negative("limit_to_last", limit)?;
        Ok(self.with_definition(|definition| {
            definition.limit = Some(limit);
            definition.limit_type = LimitType::Last;
        }))
    }

    pub fn offset(&self, offset: i64) -> FirestoreResult<Query> {
        let offset = non_negative("offset", offset)?;
        Ok(self.with_definition(|definition| definition.offset = Some(offset)))
    }

    pub fn start_at<I, V>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        let bound = Bound::new(collect_values(values), true);
        self.with_definition(|definition| definition.start_at = Some(bound))
    }

    pub fn start_after<I, V>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        let bound = Bound::new(collect_values(values), false);
        self.with_definition(|definition| definition.start_at = Some(bound))
    }

    pub fn end_at<I, V>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        let bound = Bound::new(collect_values(values), false);
        self.with_definition(|definition| definition.end_at = Some(bound))
    }

    pub fn end_before<I, V>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        let bound = Bound::new(collect_values(values), true);
        self.with_definition(|definition| definition.end_at = Some(bound))
    }

    /// Restricts the returned documents to the given fields.
    pub fn select<I, P>(&self, fields: I) -> FirestoreResult<Query>
    where
        I: IntoIterator<Item = P>,
        P: IntoFieldPath,
    {
        let fields = fields
            .into_iter()
            .map(IntoFieldPath::into_field_path)
            .collect::<FirestoreResult<Vec<_>>>()?;
        Ok(self.with_definition(|definition| definition.projection = Some(fields)))
    }

    /// Runs the query and returns the matching documents in the requested order.
    pub async fn get(&self) -> FirestoreResult<QuerySnapshot> {
        self.execute(None).await
    }

    /// Number of documents matching the filters, ignoring `limit` and `offset`.
    pub async fn count(&self) -> FirestoreResult<i64> {
        let definition = self.definition.without_limits();
        self.firestore
            .datastore()
            .run_count(&definition, None)
            .await
    }

    pub(crate) async fn execute(
        &self,
        transaction: Option<&TransactionId>,
    ) -> FirestoreResult<QuerySnapshot> {
        self.definition.validate_for_execution()?;
        let mut documents = self
            .firestore
            .datastore()
            .run_query(&self.definition, transaction)
            .await?;
        if self.definition.is_limit_to_last() {
            documents.reverse();
        }
        Ok(QuerySnapshot::new(self.clone(), documents))
    }

    fn with_definition(&self, update: impl FnOnce(&mut QueryDefinition)) -> Query {
        let mut definition = (*self.definition).clone();
        update(&mut definition);
        Query {
            firestore: self.firestore.clone(),
            definition: Arc::new(definition),
        }
    }
}

fn non_negative(name: &str, value: i64) -> FirestoreResult<i64> {
    if value < 0 {
        return Err(invalid_argument(format!(
            "{name}() requires a non-negative value, got {value}"
        )));
    }
    Ok(value)
}

fn collect_values<I, V>(values: I) -> Vec<FirestoreValue>
where
    I: IntoIterator<Item = V>,
    V: Into<FirestoreValue>,
{
    values.into_iter().map(Into::into).collect()
}

#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub(crate) fn new(query: Query, documents: Vec<DocumentSnapshot>) -> Self {
        Self { query, documents }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn into_documents(self) -> Vec<DocumentSnapshot> {
        self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::Firestore;
    use crate::firestore::error::FirestoreErrorCode;
    use crate::firestore::model::DatabaseId;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    fn firestore_with(transport: ScriptedTransport) -> Firestore {
        Firestore::with_transport(DatabaseId::default("demo"), transport)
    }

    fn posts() -> Query {
        firestore_with(ScriptedTransport::new()).collection("posts").unwrap().query()
    }

    #[test]
    fn operator_tokens_parse() {
        assert_eq!("==".parse::<FilterOperator>().unwrap(), FilterOperator::Equal);
        assert_eq!(
            "array-contains-any".parse::<FilterOperator>().unwrap(),
            FilterOperator::ArrayContainsAny
        );
        let err = "~=".parse::<FilterOperator>().unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
    }

    #[test]
    fn builders_do_not_mutate_the_original() {
        let base = posts();
        let filtered = base.where_field("published", "==", true).unwrap();
        assert!(base.definition().filters().is_empty());
        assert_eq!(filtered.definition().filters().len(), 1);
        assert_eq!(
            filtered.definition().filters()[0].operator(),
            FilterOperator::Equal
        );
    }

    #[test]
    fn limits_reject_negative_values_and_replace_each_other() {
        let transport = ScriptedTransport::new();
        let base = firestore_with(transport.clone())
            .collection("posts")
            .unwrap()
            .query();
        assert_eq!(
            base.limit(-1).unwrap_err().code,
            FirestoreErrorCode::InvalidArgument
        );
        assert_eq!(
            base.limit_to_last(-1).unwrap_err().code,
            FirestoreErrorCode::InvalidArgument
        );
        assert_eq!(
            base.offset(-1).unwrap_err().code,
            FirestoreErrorCode::InvalidArgument
        );
        assert!(transport.requests().is_empty());

        let last = base.limit(10).unwrap().limit_to_last(2).unwrap();
        assert_eq!(last.definition().limit(), Some(2));
        assert_eq!(last.definition().limit_type(), LimitType::Last);
        let first = last.limit(4).unwrap();
        assert_eq!(first.definition().limit_type(), LimitType::First);
    }

    #[test]
    fn limit_to_last_flips_order_and_swaps_cursors() {
        let query = posts()
            .order_by_with("createdAt", "asc")
            .unwrap()
            .start_after([FirestoreValue::from(1)])
            .end_at([FirestoreValue::from(9)])
            .limit_to_last(2)
            .unwrap();
        let definition = query.definition();

        let order = definition.request_order_by();
        assert_eq!(order[0].direction(), OrderDirection::Descending);

        let start = definition.request_start_at().unwrap();
        assert_eq!(start.values(), &[FirestoreValue::from(9)]);
        assert!(start.before());
        let end = definition.request_end_at().unwrap();
        assert_eq!(end.values(), &[FirestoreValue::from(1)]);
        assert!(end.before());
    }

    #[test]
    fn without_limits_strips_limit_and_offset() {
        let query = posts().limit(3).unwrap().offset(1).unwrap();
        let stripped = query.definition().without_limits();
        assert_eq!(stripped.limit(), None);
        assert_eq!(stripped.offset(), None);
    }

    #[test]
    fn sentinel_filter_values_are_rejected() {
        let err = posts()
            .where_field("updatedAt", "<", FirestoreValue::server_timestamp())
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn limit_to_last_requires_order_by() {
        let transport = ScriptedTransport::new();
        let firestore = firestore_with(transport.clone());
        let query = firestore
            .collection("posts")
            .unwrap()
            .query()
            .limit_to_last(2)
            .unwrap();
        let err = query.get().await.unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn limit_to_last_results_come_back_in_requested_order() {
        let transport = ScriptedTransport::new();
        transport.push_ok(json!([
            { "document": { "name": "projects/demo/databases/(default)/documents/posts/c",
                            "fields": { "createdAt": { "integerValue": "3" } } } },
            { "document": { "name": "projects/demo/databases/(default)/documents/posts/b",
                            "fields": { "createdAt": { "integerValue": "2" } } } },
            { "readTime": "2024-01-01T00:00:00Z" }
        ]));
        let firestore = firestore_with(transport.clone());
        let snapshot = firestore
            .collection("posts")
            .unwrap()
            .query()
            .order_by_with("createdAt", "asc")
            .unwrap()
            .limit_to_last(2)
            .unwrap()
            .get()
            .await
            .unwrap();

        let ids: Vec<&str> = snapshot.documents().iter().map(|doc| doc.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let requests = transport.requests();
        assert_eq!(requests[0].path, "documents:runQuery");
        assert_eq!(
            requests[0].body.as_ref().unwrap()["structuredQuery"]["orderBy"][0]["direction"],
            "DESCENDING"
        );
    }

    #[tokio::test]
    async fn count_uses_aggregation_without_limit() {
        let transport = ScriptedTransport::new();
        transport.push_ok(json!([
            { "result": { "aggregateFields": { "count": { "integerValue": "42" } } },
              "readTime": "2024-01-01T00:00:00Z" }
        ]));
        let firestore = firestore_with(transport.clone());
        let count = firestore
            .collection("posts")
            .unwrap()
            .query()
            .where_field("published", "==", true)
            .unwrap()
            .limit(5)
            .unwrap()
            .count()
            .await
            .unwrap();
        assert_eq!(count, 42);

        let requests = transport.requests();
        assert_eq!(requests[0].path, "documents:runAggregationQuery");
        let body = requests[0].body.as_ref().unwrap();
        let aggregation = &body["structuredAggregationQuery"];
        assert_eq!(aggregation["aggregations"][0]["alias"], "count");
        assert!(aggregation["structuredQuery"].get("limit").is_none());
    }
}
