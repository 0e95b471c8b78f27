use firestore_rest_sdk::firestore::model::{quote_path, quote_segment, DocumentKey, FieldPath, ResourcePath};
use firestore_rest_sdk::firestore::FirestoreErrorCode;

fn resource_path(path: &str) -> ResourcePath {
    ResourcePath::from_string(path).unwrap()
}

#[test]
fn indexes_into_segments() {
    let path = ResourcePath::from_segments(["rooms", "Eros", "messages"]);
    assert_eq!(path.len(), 3);
    assert_eq!(path[0], "rooms");
    assert_eq!(path[1], "Eros");
    assert_eq!(path[2], "messages");
}

#[test]
fn yields_last_segment() {
    let path = ResourcePath::from_segments(["rooms", "Eros", "messages"]);
    assert_eq!(path.last_segment(), Some("messages"));
    assert_eq!(path.without_last().last_segment(), Some("Eros"));
    assert_eq!(path.without_last().without_last().last_segment(), Some("rooms"));
}

#[test]
fn creates_child_path() {
    let base = resource_path("rooms");
    assert_eq!(base.child(["eros"]), resource_path("rooms/eros"));
    assert_eq!(base.child(["eros"]).child(["1"]), resource_path("rooms/eros/1"));
    assert_eq!(base, resource_path("rooms"));
}

#[test]
fn pop_last_repeatedly() {
    let path = ResourcePath::from_segments(["rooms", "Eros", "messages"]);
    assert_eq!(path.without_last(), ResourcePath::from_segments(["rooms", "Eros"]));
    assert_eq!(path.without_last().without_last(), ResourcePath::from_segments(["rooms"]));
    assert!(path.without_last().without_last().without_last().is_empty());
    assert_eq!(path, ResourcePath::from_segments(["rooms", "Eros", "messages"]));
}

#[test]
fn rejects_empty_segments() {
    assert!(ResourcePath::from_string("rooms//messages").is_err());
    assert!(resource_path("").is_empty());
    assert_eq!(resource_path("/rooms/eros/").canonical_string(), "rooms/eros");
}

#[test]
fn document_keys_need_an_even_path() {
    let key = DocumentKey::from_string("rooms/eros").unwrap();
    assert_eq!(key.id(), "eros");
    assert_eq!(key.collection_path(), resource_path("rooms"));
    assert!(DocumentKey::from_string("rooms").is_err());
}

#[test]
fn quotes_segments_that_are_not_identifiers() {
    assert_eq!(quote_segment("user_1"), "user_1");
    assert_eq!(quote_segment("item-001"), "`item-001`");
    assert_eq!(quote_segment("1st"), "`1st`");
    assert_eq!(quote_segment("a.b"), "`a.b`");
    assert_eq!(quote_segment("back`tick"), "`back\\`tick`");
    assert_eq!(quote_segment("slash\\"), "`slash\\\\`");
}

#[test]
fn quotes_each_segment_of_a_dotted_path() {
    assert_eq!(quote_path("stock.item-001.count").unwrap(), "stock.`item-001`.count");
    assert_eq!(quote_path("stock.`item.001`").unwrap(), "stock.`item.001`");
    let err = quote_path("a..b").unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::InvalidFieldPath);
}

#[test]
fn field_path_prefixes() {
    let a = FieldPath::parse("a").unwrap();
    let ab = FieldPath::parse("a.b").unwrap();
    let b = FieldPath::parse("b").unwrap();
    assert!(a.is_prefix_of(&a));
    assert!(a.is_prefix_of(&ab));
    assert!(!ab.is_prefix_of(&a));
    assert!(!a.is_prefix_of(&b));
    assert_eq!(a.join(&b).canonical_string(), "a.b");
    assert_eq!(FieldPath::document_id().canonical_string(), "__name__");
}
