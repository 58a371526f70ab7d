//! Core types for the caching lookup engine
//!
//! - [`Value`] / [`DataType`]: the typed cells rows are made of
//! - [`Schema`] / [`Field`]: row metadata resolved to offsets once per run
//! - [`convert`]: coercion and comparison between value types
//! - [`array`]: Arrow record batch interop
//! - [`LookupError`]: the error type shared by every lookup crate

pub mod array;
pub mod convert;
pub mod error;
pub mod schema;
pub mod types;

pub use error::{LookupError, Result, ERROR_CODE_NO_LOOKUP, ERROR_CODE_ROW_FAILURE};
pub use schema::{Field, Schema};
pub use types::*;
