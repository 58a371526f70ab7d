//! Database collaborator used by the lookup step
//!
//! Statements are structured values. They render to generic ANSI SQL via
//! `Display`, so a backend can either ship the text to a server or evaluate
//! the structure itself (as the in-memory database does).

use crate::condition::Operator;
use crate::meta::LookupMeta;
use lookup_core::{Result, Row, Schema, Value};
use std::fmt;

/// Access to the lookup table.
///
/// Implementations must tolerate [`cancel_query`](Self::cancel_query)
/// being called from a thread other than the one running queries.
pub trait Database: Send + Sync + fmt::Debug {
    /// Column layout of a table; `TableNotFound` when it does not exist.
    fn describe_table(&self, schema_name: Option<&str>, table_name: &str) -> Result<Schema>;

    /// Run a parameterized lookup. `params` holds one value per `?` in the
    /// rendered statement, in order.
    fn query(&self, statement: &LookupStatement, params: &[Value]) -> Result<QueryResult>;

    /// Read the key and return columns of every row in the table.
    fn bulk_select(&self, statement: &BulkStatement) -> Result<QueryResult>;

    /// Interrupt the running query, if any.
    fn cancel_query(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;
}

/// Rows returned by a statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn empty(schema: Schema) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `column OP ?` in a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionClause {
    pub column: String,
    pub operator: Operator,
}

impl fmt::Display for ConditionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Between => write!(f, "{} BETWEEN ? AND ?", self.column),
            Operator::IsNull | Operator::IsNotNull => {
                write!(f, "{} {}", self.column, self.operator)
            }
            op => write!(f, "{} {} ?", self.column, op),
        }
    }
}

/// Selected column with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub column: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

impl fmt::Display for SelectColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) if alias != &self.column => write!(f, "{} AS {}", self.column, alias),
            _ => write!(f, "{}", self.column),
        }
    }
}

/// `SELECT returns FROM table WHERE conditions`, limited to `max_rows`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupStatement {
    pub schema_name: Option<String>,
    pub table_name: String,
    pub returns: Vec<SelectColumn>,
    pub conditions: Vec<ConditionClause>,
    /// 1, or 2 when a second match must be detected
    pub max_rows: usize,
}

impl LookupStatement {
    pub fn from_meta(meta: &LookupMeta) -> Self {
        let returns = meta
            .returns
            .iter()
            .map(|ret| SelectColumn {
                column: ret.table_column.clone(),
                alias: ret.rename.clone().filter(|name| !name.is_empty()),
            })
            .collect();
        let conditions = meta
            .keys
            .iter()
            .map(|key| ConditionClause {
                column: key.table_column.clone(),
                operator: key.condition.operator(),
            })
            .collect();

        Self {
            schema_name: meta.schema_name.clone(),
            table_name: meta.table_name.clone(),
            returns,
            conditions,
            max_rows: if meta.fail_on_multiple_results { 2 } else { 1 },
        }
    }

    /// Number of `?` placeholders.
    pub fn param_count(&self) -> usize {
        self.conditions.iter().map(|c| c.operator.arity()).sum()
    }
}

impl fmt::Display for LookupStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.returns.is_empty() {
            write!(f, "1")?;
        }
        write_list(f, &self.returns, ", ")?;
        write!(f, " FROM ")?;
        write_table(f, self.schema_name.as_deref(), &self.table_name)?;
        if !self.conditions.is_empty() {
            write!(f, " WHERE ")?;
            write_list(f, &self.conditions, " AND ")?;
        }
        Ok(())
    }
}

/// `SELECT key columns, return columns FROM table [ORDER BY ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkStatement {
    pub schema_name: Option<String>,
    pub table_name: String,
    pub key_columns: Vec<String>,
    pub return_columns: Vec<String>,
    pub order_by: Option<String>,
}

impl BulkStatement {
    pub fn from_meta(meta: &LookupMeta) -> Self {
        Self {
            schema_name: meta.schema_name.clone(),
            table_name: meta.table_name.clone(),
            key_columns: meta.keys.iter().map(|k| k.table_column.clone()).collect(),
            return_columns: meta
                .returns
                .iter()
                .map(|r| r.table_column.clone())
                .collect(),
            order_by: meta.order_by.clone().filter(|o| !o.trim().is_empty()),
        }
    }

    /// Key columns followed by return columns.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.key_columns
            .iter()
            .chain(&self.return_columns)
            .map(String::as_str)
    }
}

impl fmt::Display for BulkStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (i, column) in self.columns().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", column)?;
        }
        write!(f, " FROM ")?;
        write_table(f, self.schema_name.as_deref(), &self.table_name)?;
        if let Some(order_by) = &self.order_by {
            write!(f, " ORDER BY {}", order_by)?;
        }
        Ok(())
    }
}

fn write_table(f: &mut fmt::Formatter<'_>, schema: Option<&str>, table: &str) -> fmt::Result {
    match schema {
        Some(schema) if !schema.is_empty() => write!(f, "{}.{}", schema, table),
        _ => write!(f, "{}", table),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::KeyCondition;
    use crate::meta::ReturnSpec;

    fn meta() -> LookupMeta {
        LookupMeta::new("rates")
            .with_schema("fx")
            .with_key("currency", KeyCondition::eq("ccy"))
            .with_key("valid", KeyCondition::between("day", "day"))
            .with_key("deleted_at", KeyCondition::IsNull)
            .with_return(ReturnSpec::new("rate"))
            .with_return(ReturnSpec::new("source").with_rename("rate_source"))
            .with_order_by("valid DESC")
    }

    #[test]
    fn test_lookup_sql() {
        let statement = LookupStatement::from_meta(&meta());
        assert_eq!(
            statement.to_string(),
            "SELECT rate, source AS rate_source FROM fx.rates \
             WHERE currency = ? AND valid BETWEEN ? AND ? AND deleted_at IS NULL"
        );
        assert_eq!(statement.param_count(), 3);
        assert_eq!(statement.max_rows, 1);
        assert_eq!(statement.returns[1].output_name(), "rate_source");
    }

    #[test]
    fn test_lookup_fetches_two_rows_when_detecting_duplicates() {
        let statement = LookupStatement::from_meta(&meta().with_fail_on_multiple_results(true));
        assert_eq!(statement.max_rows, 2);
    }

    #[test]
    fn test_bulk_sql_orders_only_bulk_query() {
        let meta = meta();
        let bulk = BulkStatement::from_meta(&meta);
        assert_eq!(
            bulk.to_string(),
            "SELECT currency, valid, deleted_at, rate, source FROM fx.rates ORDER BY valid DESC"
        );
        assert!(!LookupStatement::from_meta(&meta)
            .to_string()
            .contains("ORDER BY"));
    }

    #[test]
    fn test_unqualified_table() {
        let meta = LookupMeta::new("t").with_key("id", KeyCondition::not_eq("x"));
        assert_eq!(
            LookupStatement::from_meta(&meta).to_string(),
            "SELECT 1 FROM t WHERE id <> ?"
        );
        assert_eq!(BulkStatement::from_meta(&meta).to_string(), "SELECT id FROM t");
    }
}
