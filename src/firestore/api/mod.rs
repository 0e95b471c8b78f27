mod database;
pub mod operations;
pub mod query;
mod reference;
mod snapshot;
mod transaction;
mod write_batch;

pub use database::{Firestore, FirestoreSettings};
pub use operations::{
    delete_paths, field_transforms, merge_mask, plain_fields, update_mask, FieldTransform,
    ParsedWrite, SetOptions, TransformOperation,
};
pub use query::{
    Bound, FieldFilter, FilterOperator, IntoFilterOperator, IntoOrderDirection, LimitType,
    OrderBy, OrderDirection, Query, QueryDefinition, QuerySnapshot,
};
pub use reference::{CollectionReference, DocumentReference};
pub use snapshot::DocumentSnapshot;
pub use transaction::{Transaction, TransactionOptions};
pub use write_batch::WriteBatch;
