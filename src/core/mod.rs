// Domain modules
pub mod config;
pub mod detect;
pub mod document;
pub mod error;
pub mod identifier;
pub mod patch;
pub mod repair;
pub mod rewrite;
pub mod transaction;
pub mod validate;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
