#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(warnings)]
// Allow some overly strict pedantic lints for middleware code
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

//! API Service
//!
//! An HTTP API service skeleton: every response, success or failure, leaves
//! in one JSON envelope carrying tracing identifiers, timing and stable error
//! or route codes, and every request passes an ordered security pipeline
//! before it reaches a handler.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use domain::errors::{ErrorCategory, ErrorCode};
pub use infrastructure::config::{AppConfig, RuntimeMode};
pub use presentation::middleware::error::AppError;
