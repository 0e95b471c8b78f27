//! Test utilities shared across crate-level unit tests.

pub mod http;
pub mod scripted;

pub use http::start_mock_server;
pub use scripted::{RecordedRequest, ScriptedTransport};
