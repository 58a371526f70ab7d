//! Loading the whole lookup table into the cache

use crate::database::{BulkStatement, Database};
use lookup_cache::{LookupCache, RowKey};
use lookup_core::convert::convert_all;
use lookup_core::{DataType, LookupError, Result};
use tracing::{debug, info};

/// Fills a cache from one full-table read.
pub struct BulkLoader<'a> {
    database: &'a dyn Database,
    /// Table type of each key column, one per key condition
    key_types: &'a [DataType],
    return_types: &'a [DataType],
}

impl<'a> BulkLoader<'a> {
    pub fn new(
        database: &'a dyn Database,
        key_types: &'a [DataType],
        return_types: &'a [DataType],
    ) -> Self {
        Self {
            database,
            key_types,
            return_types,
        }
    }

    /// Run `statement` and insert every row into `cache`, later rows
    /// overwriting earlier ones with the same key. The cache is marked as
    /// bulk-loaded before the first insert, so nothing is evicted.
    ///
    /// Returns the number of rows read.
    pub fn load(&self, statement: &BulkStatement, cache: &mut LookupCache) -> Result<usize> {
        debug!(sql = %statement, "Loading lookup table into cache");
        let result = self.database.bulk_select(statement)?;

        let n_keys = self.key_types.len();
        let width = n_keys + self.return_types.len();

        cache.mark_bulk_loaded();
        for row in &result.rows {
            if row.len() < width {
                return Err(LookupError::Database(format!(
                    "Bulk load returned {} columns, expected {}",
                    row.len(),
                    width
                )));
            }
            let key = convert_all(&row[..n_keys], self.key_types)?;
            let values = convert_all(&row[n_keys..width], self.return_types)?;
            cache.put(RowKey::new(key), values);
        }

        info!(
            rows = result.rows.len(),
            entries = cache.len(),
            table = %statement.table_name,
            "Bulk loaded lookup cache"
        );
        Ok(result.rows.len())
    }
}
