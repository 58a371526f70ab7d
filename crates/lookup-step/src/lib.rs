//! Caching database lookup step
//!
//! For every input row the step builds a key from configured stream
//! fields, probes its cache, falls back to one parameterized query against
//! the lookup table, and appends the returned values to the row.
//!
//! # Example
//!
//! ```ignore
//! use lookup_step::{KeyCondition, LookupMeta, LookupStep, ReturnSpec};
//! use lookup_cache::CacheConfig;
//!
//! let meta = LookupMeta::new("customers")
//!     .with_key("id", KeyCondition::eq("customer_id"))
//!     .with_return(ReturnSpec::new("name").with_default("unknown"))
//!     .with_cache(CacheConfig::new(10_000));
//!
//! let mut step = LookupStep::new(meta, database);
//! let counters = step.run(&mut source, &mut sink)?;
//! step.dispose()?;
//! ```

pub mod bulk;
pub mod condition;
pub mod database;
pub mod meta;
pub mod step;
pub mod stream;

pub use bulk::BulkLoader;
pub use condition::{ConditionEvaluator, KeyCondition, LookupStrategy, Operator};
pub use database::{
    BulkStatement, ConditionClause, Database, LookupStatement, QueryResult, SelectColumn,
};
pub use meta::{KeySpec, LookupMeta, ReturnSpec};
pub use step::{LookupOutcome, LookupStep, RowResult, StepCounters, StepState, StopHandle};
pub use stream::{ChannelRowSource, CollectingSink, ErrorDescriptor, RowSink, RowSource, VecRowSource};
