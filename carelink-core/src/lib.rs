//! Core data model and request security for carelink

pub mod auth;
pub mod clock;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::*;
pub use types::*;

/// Result type alias for carelink operations
pub type Result<T> = std::result::Result<T, CoreError>;
