//! Firestore REST client: value codec, write compiler, structured queries and transactions.

pub mod api;
mod constants;
pub mod error;
pub mod model;
pub mod remote;
pub mod value;

pub use api::{
    CollectionReference, DocumentReference, DocumentSnapshot, FilterOperator, Firestore,
    FirestoreSettings, OrderDirection, Query, QuerySnapshot, SetOptions, Transaction,
    TransactionOptions, WriteBatch,
};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
pub use model::{DatabaseId, DocumentKey, FieldPath, GeoPoint, Timestamp};
pub use remote::{RetrySettings, StaticTokenProvider, TokenProvider, Transport};
pub use value::{FirestoreValue, MapValue};
