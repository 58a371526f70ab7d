//! Lookup step configuration
//!
//! [`LookupMeta`] is the persisted description of one lookup step. It is
//! read from JSON, validated once, and handed to
//! [`LookupStep::new`](crate::LookupStep::new).

use crate::condition::KeyCondition;
use lookup_cache::CacheConfig;
use lookup_core::{DataType, LookupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One lookup key: a table column compared against stream field(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub table_column: String,
    pub condition: KeyCondition,
}

impl KeySpec {
    pub fn new(table_column: impl Into<String>, condition: KeyCondition) -> Self {
        Self {
            table_column: table_column.into(),
            condition,
        }
    }
}

/// One value fetched from the table and appended to the output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSpec {
    pub table_column: String,
    /// Output field name; the table column name when absent
    #[serde(default)]
    pub rename: Option<String>,
    /// Literal substituted when the lookup misses
    #[serde(default)]
    pub default: Option<String>,
    /// Type the default literal is written in; the column type when absent
    #[serde(default)]
    pub default_type: Option<DataType>,
}

impl ReturnSpec {
    pub fn new(table_column: impl Into<String>) -> Self {
        Self {
            table_column: table_column.into(),
            rename: None,
            default: None,
            default_type: None,
        }
    }

    pub fn with_rename(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }

    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    pub fn with_default_type(mut self, data_type: DataType) -> Self {
        self.default_type = Some(data_type);
        self
    }

    /// Name of the field this value is written to.
    pub fn output_name(&self) -> &str {
        match &self.rename {
            Some(name) if !name.is_empty() => name,
            _ => &self.table_column,
        }
    }
}

/// Configuration of a lookup step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupMeta {
    #[serde(default)]
    pub schema_name: Option<String>,
    pub table_name: String,
    #[serde(default)]
    pub keys: Vec<KeySpec>,
    #[serde(default)]
    pub returns: Vec<ReturnSpec>,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Appended to the bulk load query as `ORDER BY <clause>`
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub fail_on_multiple_results: bool,
    /// Drop rows whose lookup misses instead of emitting them
    #[serde(default)]
    pub eat_row_on_failure: bool,
    /// Send failing rows to the error stream instead of aborting
    #[serde(default)]
    pub error_handling: bool,
}

impl LookupMeta {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            schema_name: None,
            table_name: table_name.into(),
            keys: Vec::new(),
            returns: Vec::new(),
            cache: CacheConfig::default(),
            order_by: None,
            fail_on_multiple_results: false,
            eat_row_on_failure: false,
            error_handling: false,
        }
    }

    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    pub fn with_key(mut self, table_column: impl Into<String>, condition: KeyCondition) -> Self {
        self.keys.push(KeySpec::new(table_column, condition));
        self
    }

    pub fn with_return(mut self, ret: ReturnSpec) -> Self {
        self.returns.push(ret);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_fail_on_multiple_results(mut self, fail: bool) -> Self {
        self.fail_on_multiple_results = fail;
        self
    }

    pub fn with_eat_row_on_failure(mut self, eat: bool) -> Self {
        self.eat_row_on_failure = eat;
        self
    }

    pub fn with_error_handling(mut self, enabled: bool) -> Self {
        self.error_handling = enabled;
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `schema.table`, or just the table when no schema is set.
    pub fn qualified_table(&self) -> String {
        match &self.schema_name {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.table_name),
            _ => self.table_name.clone(),
        }
    }

    /// Check the configuration for errors that do not need the database
    /// or the input layout.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(LookupError::Configuration(
                "No lookup table specified".to_string(),
            ));
        }

        for key in &self.keys {
            if key.table_column.trim().is_empty() {
                return Err(LookupError::Configuration(
                    "Lookup key without a table column".to_string(),
                ));
            }
            if key.condition.fields().iter().any(|f| f.trim().is_empty()) {
                return Err(LookupError::Configuration(format!(
                    "Lookup key on column '{}' needs a stream field for {}",
                    key.table_column,
                    key.condition.operator()
                )));
            }
        }

        let mut names = HashSet::new();
        for ret in &self.returns {
            if ret.table_column.trim().is_empty() {
                return Err(LookupError::Configuration(
                    "Return value without a table column".to_string(),
                ));
            }
            if !names.insert(ret.output_name().to_string()) {
                return Err(LookupError::Configuration(format!(
                    "Return field '{}' is defined more than once",
                    ret.output_name()
                )));
            }
        }

        Ok(())
    }
}
