//! Lookup table storage
//!
//! [`MemoryDatabase`] implements the lookup [`Database`](lookup_step::Database)
//! contract over Arrow tables, which can be loaded from CSV files.

pub mod csv;
pub mod memory;

pub use csv::{read_csv, write_csv, CsvRowSource};
pub use memory::{like_match, MemoryDatabase};
