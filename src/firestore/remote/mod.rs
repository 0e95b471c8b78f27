pub mod connection;
pub mod datastore;
pub mod rpc_error;
pub mod serializer;
pub mod structured_query;
pub mod wire;

pub use connection::{Connection, ConnectionBuilder, RequestContext};
pub use datastore::{
    Datastore, HttpDatastore, HttpDatastoreBuilder, NoopTokenProvider, RetrySettings,
    StaticTokenProvider, TokenProvider, TokenProviderArc, TransactionId, Transport, TransportArc,
    WriteOperation,
};
pub use rpc_error::map_http_error;
pub use serializer::JsonProtoSerializer;
