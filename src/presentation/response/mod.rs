//! Uniform response envelope written for every request, success or failure.

pub mod api_response;
pub mod envelope;

pub use api_response::{route_error, route_success, ApiResponse};
pub use envelope::{format_timestamp, DebugMetadata, ResponseEnvelope};
