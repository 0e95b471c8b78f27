use std::collections::{BTreeMap, HashSet};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, IntoFieldPath};
use crate::firestore::remote::datastore::{Precondition, WriteOperation};
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// Options that turn a `set` into a merge.
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    /// Merge every field present in the data into the existing document.
    pub merge: bool,
    /// Merge only these paths. Takes precedence over `merge`.
    pub merge_fields: Option<Vec<FieldPath>>,
}

impl SetOptions {
    pub fn merge_all() -> Self {
        Self {
            merge: true,
            merge_fields: None,
        }
    }

    pub fn merge_fields<I, P>(fields: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: IntoFieldPath,
    {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for field in fields {
            let field = field.into_field_path()?;
            if seen.insert(field.clone()) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(invalid_argument(
                "merge_fields requires at least one field path",
            ));
        }
        Ok(Self {
            merge: false,
            merge_fields: Some(unique),
        })
    }

    pub fn is_merge(&self) -> bool {
        self.merge || self.merge_fields.is_some()
    }
}

/// A server-side mutation applied to one field after the masked update.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    ServerTimestamp,
    Increment(FirestoreValue),
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
}

/// A write payload split into what the backend needs to apply it.
///
/// Keys are visited depth-first in map order. A key containing dots is split on
/// them, so `{"user.age": 1}` and `{"user": {"age": 1}}` describe the same leaf.
/// Segments are otherwise taken literally: backslashes and backticks in a key are
/// data, not path syntax.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedWrite {
    fields: BTreeMap<String, FirestoreValue>,
    leaf_paths: Vec<FieldPath>,
    delete_paths: Vec<FieldPath>,
    transforms: Vec<FieldTransform>,
}

impl ParsedWrite {
    pub fn parse(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Self> {
        let mut parsed = ParsedWrite::default();
        parsed.visit_map(data, &[])?;
        parsed.check_overlapping_paths()?;
        Ok(parsed)
    }

    /// The payload with every sentinel removed, nested back into maps.
    pub fn fields(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.fields
    }

    /// Paths of every plain (non-sentinel) leaf.
    pub fn leaf_paths(&self) -> &[FieldPath] {
        &self.leaf_paths
    }

    pub fn delete_paths(&self) -> &[FieldPath] {
        &self.delete_paths
    }

    pub fn transforms(&self) -> &[FieldTransform] {
        &self.transforms
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_paths.is_empty() && self.delete_paths.is_empty() && self.transforms.is_empty()
    }

    /// Mask for a partial update: plain leaves plus deletes. Transformed paths are left
    /// out since the backend applies transforms after the masked update.
    pub fn update_mask(&self) -> Vec<FieldPath> {
        let transformed: HashSet<&FieldPath> =
            self.transforms.iter().map(FieldTransform::field_path).collect();
        let deleted: HashSet<&FieldPath> = self.delete_paths.iter().collect();
        let mut mask = Vec::new();
        let mut seen = HashSet::new();
        for path in &self.leaf_paths {
            if transformed.contains(path) || deleted.contains(path) {
                continue;
            }
            if seen.insert(path) {
                mask.push(path.clone());
            }
        }
        for path in &self.delete_paths {
            if seen.insert(path) {
                mask.push(path.clone());
            }
        }
        mask
    }

    /// Mask for `set` with `merge`: every plain leaf, plus delete paths so that deletes
    /// take effect. Sentinel transforms stay out of the mask.
    pub fn merge_mask(&self) -> Vec<FieldPath> {
        let mut mask = Vec::new();
        let mut seen = HashSet::new();
        for path in self.leaf_paths.iter().chain(&self.delete_paths) {
            if seen.insert(path) {
                mask.push(path.clone());
            }
        }
        mask
    }

    fn visit_map(
        &mut self,
        data: &BTreeMap<String, FirestoreValue>,
        parent: &[String],
    ) -> FirestoreResult<()> {
        for (key, value) in data {
            let mut segments = parent.to_vec();
            segments.extend(key.split('.').map(str::to_string));
            self.visit_value(value, segments)?;
        }
        Ok(())
    }

    /// Rejects payloads naming a path twice, or a path together with one of its children.
    fn check_overlapping_paths(&self) -> FirestoreResult<()> {
        let mut all: Vec<&FieldPath> = self
            .leaf_paths
            .iter()
            .chain(&self.delete_paths)
            .chain(self.transforms.iter().map(FieldTransform::field_path))
            .collect();
        all.sort();
        // A prefix sorts directly before the paths it covers.
        for pair in all.windows(2) {
            if pair[0].is_prefix_of(pair[1]) {
                return Err(invalid_argument(format!(
                    "Field '{}' conflicts with field '{}' in the same write",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }

    fn visit_value(&mut self, value: &FirestoreValue, segments: Vec<String>) -> FirestoreResult<()> {
        match value.kind() {
            ValueKind::Sentinel(sentinel) => {
                let path = FieldPath::new(segments)?;
                match transform_from_sentinel(sentinel, &path)? {
                    Some(operation) => self.transforms.push(FieldTransform::new(path, operation)),
                    None => self.delete_paths.push(path),
                }
            }
            ValueKind::Map(map) if !map.is_empty() => self.visit_map(map.fields(), &segments)?,
            _ => {
                let path = FieldPath::new(segments)?;
                assert_no_sentinel_in_value(value, &path)?;
                set_value_at_segments(&mut self.fields, path.segments(), value.clone());
                self.leaf_paths.push(path);
            }
        }
        Ok(())
    }
}

/// Payload without sentinels, ready for the value codec.
pub fn plain_fields(
    data: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    Ok(ParsedWrite::parse(data)?.fields)
}

/// Paths whose value is [`FirestoreValue::delete_field`].
pub fn delete_paths(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Vec<FieldPath>> {
    Ok(ParsedWrite::parse(data)?.delete_paths)
}

/// Server transforms requested by the payload's sentinels, in traversal order.
pub fn field_transforms(
    data: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<Vec<FieldTransform>> {
    Ok(ParsedWrite::parse(data)?.transforms)
}

pub fn update_mask(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Vec<FieldPath>> {
    Ok(ParsedWrite::parse(data)?.update_mask())
}

pub fn merge_mask(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Vec<FieldPath>> {
    Ok(ParsedWrite::parse(data)?.merge_mask())
}

/// Compiles `set`, with or without merge.
pub(crate) fn compile_set(
    key: DocumentKey,
    data: &BTreeMap<String, FirestoreValue>,
    options: &SetOptions,
) -> FirestoreResult<WriteOperation> {
    let parsed = ParsedWrite::parse(data)?;
    if !options.is_merge() && !parsed.delete_paths.is_empty() {
        return Err(invalid_argument(format!(
            "delete_field() cannot be used with set() unless merging (found in field '{}')",
            parsed.delete_paths[0]
        )));
    }

    let (mask, transforms) = match &options.merge_fields {
        Some(merge_fields) => {
            validate_merge_fields(merge_fields, &parsed)?;
            let transforms = parsed
                .transforms
                .iter()
                .filter(|transform| {
                    merge_fields
                        .iter()
                        .any(|field| field.is_prefix_of(transform.field_path()))
                })
                .cloned()
                .collect();
            (Some(merge_fields.clone()), transforms)
        }
        None if options.merge => (Some(parsed.merge_mask()), parsed.transforms.clone()),
        None => (None, parsed.transforms.clone()),
    };

    Ok(WriteOperation::Upsert {
        key,
        fields: MapValue::new(parsed.fields),
        mask,
        transforms,
        precondition: None,
    })
}

/// Compiles a create: a full set that fails if the document already exists.
pub(crate) fn compile_create(
    key: DocumentKey,
    data: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<WriteOperation> {
    match compile_set(key, data, &SetOptions::default())? {
        WriteOperation::Upsert {
            key,
            fields,
            transforms,
            ..
        } => Ok(WriteOperation::Upsert {
            key,
            fields,
            mask: None,
            transforms,
            precondition: Some(Precondition::Exists(false)),
        }),
        other => Ok(other),
    }
}

/// Compiles a partial update of an existing document.
pub(crate) fn compile_update(
    key: DocumentKey,
    data: &BTreeMap<String, FirestoreValue>,
) -> FirestoreResult<WriteOperation> {
    let parsed = ParsedWrite::parse(data)?;
    if parsed.is_empty() {
        return Err(invalid_argument("update() requires at least one field"));
    }

    let mask = parsed.update_mask();
    if mask.is_empty() {
        return Ok(WriteOperation::TransformOnly {
            key,
            transforms: parsed.transforms,
            precondition: Some(Precondition::Exists(true)),
        });
    }

    Ok(WriteOperation::Upsert {
        key,
        fields: MapValue::new(parsed.fields),
        mask: Some(mask),
        transforms: parsed.transforms,
        precondition: Some(Precondition::Exists(true)),
    })
}

fn validate_merge_fields(merge_fields: &[FieldPath], parsed: &ParsedWrite) -> FirestoreResult<()> {
    let present: Vec<&FieldPath> = parsed
        .leaf_paths
        .iter()
        .chain(&parsed.delete_paths)
        .chain(parsed.transforms.iter().map(FieldTransform::field_path))
        .collect();
    for field in merge_fields {
        if !present.iter().any(|path| field.is_prefix_of(path)) {
            return Err(invalid_argument(format!(
                "Field '{field}' is specified in merge_fields but missing from the provided data"
            )));
        }
    }
    Ok(())
}

/// `Ok(None)` means the sentinel is a delete.
fn transform_from_sentinel(
    sentinel: &SentinelValue,
    path: &FieldPath,
) -> FirestoreResult<Option<TransformOperation>> {
    Ok(Some(match sentinel {
        SentinelValue::Delete => return Ok(None),
        SentinelValue::ServerTimestamp => TransformOperation::ServerTimestamp,
        SentinelValue::Increment(operand) => match operand.kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => {
                TransformOperation::Increment(operand.as_ref().clone())
            }
            other => {
                return Err(invalid_argument(format!(
                    "increment() requires a numeric operand, got {} in field '{path}'",
                    other.type_name()
                )))
            }
        },
        SentinelValue::ArrayUnion(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, path)?;
            }
            TransformOperation::ArrayUnion(elements.clone())
        }
        SentinelValue::ArrayRemove(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, path)?;
            }
            TransformOperation::ArrayRemove(elements.clone())
        }
    }))
}

fn assert_no_sentinel_in_value(value: &FirestoreValue, context: &FieldPath) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(sentinel) => Err(invalid_argument(format!(
            "{} can only appear as a field value, not inside an array (field '{context}')",
            sentinel.name()
        ))),
        ValueKind::Array(array) => array
            .values()
            .iter()
            .try_for_each(|element| assert_no_sentinel_in_value(element, context)),
        ValueKind::Map(map) => map
            .fields()
            .values()
            .try_for_each(|element| assert_no_sentinel_in_value(element, context)),
        _ => Ok(()),
    }
}

fn set_value_at_segments(
    fields: &mut BTreeMap<String, FirestoreValue>,
    segments: &[String],
    value: FirestoreValue,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }

    let entry = fields
        .entry(first.clone())
        .or_insert_with(|| FirestoreValue::from_map(BTreeMap::new()));
    let mut child_fields = match entry.kind() {
        ValueKind::Map(map) => map.fields().clone(),
        _ => BTreeMap::new(),
    };
    set_value_at_segments(&mut child_fields, rest, value);
    *entry = FirestoreValue::from_map(child_fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(paths: &[FieldPath]) -> Vec<String> {
        paths.iter().map(FieldPath::canonical_string).collect()
    }

    fn key() -> DocumentKey {
        DocumentKey::from_string("inventory/shop").unwrap()
    }

    #[test]
    fn increment_becomes_a_transform_and_leaves_no_field() {
        let data = BTreeMap::from([("count".to_string(), FirestoreValue::increment(5))]);
        let parsed = ParsedWrite::parse(&data).unwrap();
        assert!(parsed.fields().is_empty());
        assert_eq!(parsed.transforms().len(), 1);
        assert_eq!(parsed.transforms()[0].field_path().canonical_string(), "count");
        assert_eq!(
            parsed.transforms()[0].operation(),
            &TransformOperation::Increment(FirestoreValue::from_integer(5))
        );
    }

    #[test]
    fn delete_is_only_a_path() {
        let data = BTreeMap::from([
            ("obsolete".to_string(), FirestoreValue::delete_field()),
            ("kept".to_string(), FirestoreValue::from_bool(true)),
        ]);
        assert_eq!(paths(&delete_paths(&data).unwrap()), vec!["obsolete"]);
        let fields = plain_fields(&data).unwrap();
        assert!(!fields.contains_key("obsolete"));
        assert!(fields.contains_key("kept"));
        assert!(field_transforms(&data).unwrap().is_empty());
    }

    #[test]
    fn dotted_keys_and_nested_maps_are_equivalent() {
        let flat = BTreeMap::from([
            ("itemsSold.item-001".to_string(), FirestoreValue::increment(1)),
            ("user.age".to_string(), FirestoreValue::from_integer(30)),
        ]);
        let nested = BTreeMap::from([
            (
                "itemsSold".to_string(),
                FirestoreValue::from_map(BTreeMap::from([(
                    "item-001".to_string(),
                    FirestoreValue::increment(1),
                )])),
            ),
            (
                "user".to_string(),
                FirestoreValue::from_map(BTreeMap::from([(
                    "age".to_string(),
                    FirestoreValue::from_integer(30),
                )])),
            ),
        ]);

        let flat = ParsedWrite::parse(&flat).unwrap();
        let nested = ParsedWrite::parse(&nested).unwrap();
        assert_eq!(flat, nested);
        assert_eq!(
            flat.transforms()[0].field_path().canonical_string(),
            "itemsSold.`item-001`"
        );
        assert_eq!(paths(&flat.update_mask()), vec!["user.age"]);
    }

    #[test]
    fn update_mask_covers_leaves_and_deletes_but_not_transforms() {
        let data = BTreeMap::from([
            ("a".to_string(), FirestoreValue::from_integer(1)),
            (
                "b".to_string(),
                FirestoreValue::from_map(BTreeMap::from([
                    ("c".to_string(), FirestoreValue::from_string("x")),
                    ("d-e".to_string(), FirestoreValue::delete_field()),
                ])),
            ),
            ("stamp".to_string(), FirestoreValue::server_timestamp()),
        ]);
        assert_eq!(paths(&update_mask(&data).unwrap()), vec!["a", "b.c", "b.`d-e`"]);
        // Merge masks keep delete paths too, or delete_field() in a merge set would
        // never reach the stored document.
        assert_eq!(paths(&merge_mask(&data).unwrap()), vec!["a", "b.c", "b.`d-e`"]);
    }

    #[test]
    fn keys_keep_backslashes_and_backticks_literally() {
        let data = BTreeMap::from([
            ("C:\\dir".to_string(), FirestoreValue::from_integer(1)),
            ("it`s".to_string(), FirestoreValue::from_integer(2)),
            ("`x`".to_string(), FirestoreValue::from_integer(3)),
        ]);
        let parsed = ParsedWrite::parse(&data).unwrap();
        let keys: Vec<&str> = parsed.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C:\\dir", "`x`", "it`s"]);
        assert_eq!(
            paths(&parsed.update_mask()),
            vec!["`C:\\\\dir`", "`\\`x\\``", "`it\\`s`"]
        );
    }

    #[test]
    fn empty_key_segments_are_rejected() {
        for key in ["", "a..b", "trailing."] {
            let data = BTreeMap::from([(key.to_string(), FirestoreValue::from_integer(1))]);
            let err = ParsedWrite::parse(&data).unwrap_err();
            assert_eq!(err.code_str(), "firestore/invalid-field-path", "key {key:?}");
        }
    }

    #[test]
    fn overlapping_paths_are_rejected() {
        let parent_and_child = BTreeMap::from([
            ("a".to_string(), FirestoreValue::from_integer(1)),
            ("a.b".to_string(), FirestoreValue::from_integer(2)),
        ]);
        let err = ParsedWrite::parse(&parent_and_child).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
        assert!(err.message().contains("'a'") && err.message().contains("'a.b'"));

        let same_leaf_twice = BTreeMap::from([
            ("a.b".to_string(), FirestoreValue::delete_field()),
            (
                "a".to_string(),
                FirestoreValue::from_map(BTreeMap::from([(
                    "b".to_string(),
                    FirestoreValue::increment(1),
                )])),
            ),
        ]);
        assert!(ParsedWrite::parse(&same_leaf_twice).is_err());

        let siblings = BTreeMap::from([
            ("a.b".to_string(), FirestoreValue::from_integer(1)),
            ("a.c".to_string(), FirestoreValue::server_timestamp()),
            ("ab".to_string(), FirestoreValue::from_integer(3)),
        ]);
        assert!(ParsedWrite::parse(&siblings).is_ok());
    }

    #[test]
    fn empty_maps_are_leaves() {
        let data = BTreeMap::from([("empty".to_string(), FirestoreValue::from_map(BTreeMap::new()))]);
        let parsed = ParsedWrite::parse(&data).unwrap();
        assert_eq!(paths(parsed.leaf_paths()), vec!["empty"]);
        assert!(parsed.fields()["empty"].as_map().unwrap().is_empty());
    }

    #[test]
    fn update_with_only_transforms_is_transform_only() {
        let data = BTreeMap::from([("counter".to_string(), FirestoreValue::increment(1))]);
        match compile_update(key(), &data).unwrap() {
            WriteOperation::TransformOnly {
                transforms,
                precondition,
                ..
            } => {
                assert_eq!(transforms.len(), 1);
                assert_eq!(precondition, Some(Precondition::Exists(true)));
            }
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[test]
    fn update_requires_fields() {
        let err = compile_update(key(), &BTreeMap::new()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn plain_set_rejects_delete() {
        let data = BTreeMap::from([("gone".to_string(), FirestoreValue::delete_field())]);
        let err = compile_set(key(), &data, &SetOptions::default()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
        assert!(compile_set(key(), &data, &SetOptions::merge_all()).is_ok());
    }

    #[test]
    fn merge_fields_filters_transforms() {
        let data = BTreeMap::from([
            ("a".to_string(), FirestoreValue::from_integer(1)),
            ("stamp".to_string(), FirestoreValue::server_timestamp()),
            ("other".to_string(), FirestoreValue::server_timestamp()),
        ]);
        let options = SetOptions::merge_fields(["a", "stamp"]).unwrap();
        match compile_set(key(), &data, &options).unwrap() {
            WriteOperation::Upsert { mask, transforms, .. } => {
                assert_eq!(paths(&mask.unwrap()), vec!["a", "stamp"]);
                assert_eq!(transforms.len(), 1);
                assert_eq!(transforms[0].field_path().canonical_string(), "stamp");
            }
            other => panic!("unexpected write {other:?}"),
        }

        let missing = SetOptions::merge_fields(["nope"]).unwrap();
        assert!(compile_set(key(), &data, &missing).is_err());
    }

    #[test]
    fn create_requires_absent_document() {
        let data = BTreeMap::from([("a".to_string(), FirestoreValue::from_integer(1))]);
        match compile_create(key(), &data).unwrap() {
            WriteOperation::Upsert { precondition, mask, .. } => {
                assert_eq!(precondition, Some(Precondition::Exists(false)));
                assert!(mask.is_none());
            }
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[test]
    fn array_rejects_nested_sentinel() {
        let data = BTreeMap::from([(
            "values".to_string(),
            FirestoreValue::from_array(vec![FirestoreValue::server_timestamp()]),
        )]);
        let err = ParsedWrite::parse(&data).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn increment_requires_numeric_operand() {
        let data = BTreeMap::from([("total".to_string(), FirestoreValue::increment("five"))]);
        let err = ParsedWrite::parse(&data).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }
}
