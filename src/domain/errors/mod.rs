//! Error taxonomy shared by every layer: stable codes, their families and the
//! categories that decide the HTTP status.

pub mod category;
pub mod codes;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, ErrorPrefix};
