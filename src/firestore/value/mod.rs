mod array_value;
mod bytes_value;
mod convert;
mod map_value;
mod value;

pub use array_value::ArrayValue;
pub use bytes_value::BytesValue;
pub use convert::{from_firestore_map, to_firestore_map};
pub use map_value::MapValue;
pub use value::{FirestoreValue, SentinelValue, ValueKind};
