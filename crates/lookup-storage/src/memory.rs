//! In-memory lookup database
//!
//! Tables are held as Arrow record batches. Lookup and bulk statements are
//! evaluated directly from their structure with SQL semantics: comparisons
//! involving NULL never match, `LIKE` supports `%` and `_`.

use arrow::record_batch::RecordBatch;
use lookup_core::array::{normalize_batch, rows_to_batch, value_at};
use lookup_core::convert::compare;
use lookup_core::{Field, LookupError, Result, Row, Schema, Value};
use lookup_step::{BulkStatement, Database, LookupStatement, Operator, QueryResult};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: Schema,
    batches: Vec<RecordBatch>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Result<(usize, &Field)> {
        let field = self
            .schema
            .search(name)
            .ok_or_else(|| LookupError::ColumnNotFound(name.to_string()))?;
        let index = self.schema.index_of(field.name())?;
        Ok((index, field))
    }

    fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Database backed by in-memory Arrow tables
#[derive(Debug)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, MemoryTable>>,
    connected: AtomicBool,
    cancelled: AtomicBool,
    queries: AtomicU64,
    bulk_selects: AtomicU64,
    cancels: AtomicU64,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
            queries: AtomicU64::new(0),
            bulk_selects: AtomicU64::new(0),
            cancels: AtomicU64::new(0),
        }
    }

    /// Register a table from record batches. `name` may be schema-qualified
    /// (`schema.table`). An existing table with the same name is replaced.
    pub fn register_batches(&self, name: &str, batches: Vec<RecordBatch>) -> Result<Schema> {
        let first = batches.first().ok_or_else(|| {
            LookupError::Configuration(format!("Table '{}' needs at least one batch", name))
        })?;
        let schema = Schema::from_arrow(first.schema().as_ref());

        let batches = batches
            .iter()
            .map(normalize_batch)
            .collect::<Result<Vec<_>>>()?;
        if let Some(batch) = batches
            .iter()
            .find(|b| Schema::from_arrow(b.schema().as_ref()) != schema)
        {
            return Err(LookupError::Configuration(format!(
                "Batch layout {:?} does not match table '{}'",
                batch.schema(),
                name
            )));
        }

        self.insert_table(name, MemoryTable {
            schema: schema.clone(),
            batches,
        });
        Ok(schema)
    }

    /// Register a table from rows whose values already match `schema`.
    pub fn register_rows(&self, name: &str, schema: &Schema, rows: &[Row]) -> Result<()> {
        let batch = rows_to_batch(schema, rows)?;
        self.insert_table(name, MemoryTable {
            schema: schema.clone(),
            batches: vec![batch],
        });
        Ok(())
    }

    fn insert_table(&self, name: &str, table: MemoryTable) {
        debug!(table = name, rows = table.row_count(), "Registered table");
        self.tables.write().insert(name.to_ascii_lowercase(), table);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn table(&self, schema_name: Option<&str>, table_name: &str) -> Result<MemoryTable> {
        let name = qualified_name(schema_name, table_name);
        self.tables
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or(LookupError::TableNotFound(name))
    }

    fn check_usable(&self) -> Result<()> {
        if !self.connected.load(AtomicOrdering::SeqCst) {
            return Err(LookupError::Database("Not connected".to_string()));
        }
        if self.cancelled.load(AtomicOrdering::SeqCst) {
            return Err(LookupError::Cancelled);
        }
        Ok(())
    }

    /// Number of lookup statements executed
    pub fn query_count(&self) -> u64 {
        self.queries.load(AtomicOrdering::Relaxed)
    }

    pub fn bulk_select_count(&self) -> u64 {
        self.bulk_selects.load(AtomicOrdering::Relaxed)
    }

    pub fn cancel_count(&self) -> u64 {
        self.cancels.load(AtomicOrdering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }

    /// Reopen after `disconnect` or `cancel_query`.
    pub fn reconnect(&self) {
        self.cancelled.store(false, AtomicOrdering::SeqCst);
        self.connected.store(true, AtomicOrdering::SeqCst);
    }
}

impl Database for MemoryDatabase {
    fn describe_table(&self, schema_name: Option<&str>, table_name: &str) -> Result<Schema> {
        Ok(self.table(schema_name, table_name)?.schema)
    }

    fn query(&self, statement: &LookupStatement, params: &[Value]) -> Result<QueryResult> {
        self.check_usable()?;
        self.queries.fetch_add(1, AtomicOrdering::Relaxed);

        if params.len() != statement.param_count() {
            return Err(LookupError::Database(format!(
                "Statement expects {} parameters, got {}",
                statement.param_count(),
                params.len()
            )));
        }

        let table = self.table(statement.schema_name.as_deref(), &statement.table_name)?;

        let mut conditions = Vec::with_capacity(statement.conditions.len());
        let mut cursor = 0;
        for clause in &statement.conditions {
            let (index, _) = table.column(&clause.column)?;
            let arity = clause.operator.arity();
            conditions.push((index, clause.operator, &params[cursor..cursor + arity]));
            cursor += arity;
        }

        let mut returns = Vec::with_capacity(statement.returns.len());
        let mut fields = Vec::with_capacity(statement.returns.len());
        for column in &statement.returns {
            let (index, field) = table.column(&column.column)?;
            returns.push(index);
            fields.push(field.renamed(column.output_name()));
        }

        let mut rows = Vec::new();
        'batches: for batch in &table.batches {
            if self.cancelled.load(AtomicOrdering::SeqCst) {
                return Err(LookupError::Cancelled);
            }
            for row in 0..batch.num_rows() {
                let mut matched = true;
                for (index, operator, operands) in &conditions {
                    let value = value_at(batch.column(*index).as_ref(), row)?;
                    if !sql_matches(*operator, &value, operands) {
                        matched = false;
                        break;
                    }
                }
                if !matched {
                    continue;
                }

                rows.push(
                    returns
                        .iter()
                        .map(|&index| value_at(batch.column(index).as_ref(), row))
                        .collect::<Result<Row>>()?,
                );
                if rows.len() >= statement.max_rows {
                    break 'batches;
                }
            }
        }

        Ok(QueryResult::new(Schema::new(fields), rows))
    }

    fn bulk_select(&self, statement: &BulkStatement) -> Result<QueryResult> {
        self.check_usable()?;
        self.bulk_selects.fetch_add(1, AtomicOrdering::Relaxed);

        let table = self.table(statement.schema_name.as_deref(), &statement.table_name)?;

        let mut selected = Vec::new();
        let mut fields = Vec::new();
        for name in statement.columns() {
            let (index, field) = table.column(name)?;
            selected.push(index);
            fields.push(field.clone());
        }

        let order = match &statement.order_by {
            Some(clause) => parse_order_by(clause, &table)?,
            None => Vec::new(),
        };

        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::with_capacity(table.row_count());
        for batch in &table.batches {
            if self.cancelled.load(AtomicOrdering::SeqCst) {
                return Err(LookupError::Cancelled);
            }
            for row in 0..batch.num_rows() {
                let sort_key = order
                    .iter()
                    .map(|(index, _)| value_at(batch.column(*index).as_ref(), row))
                    .collect::<Result<Vec<_>>>()?;
                let values = selected
                    .iter()
                    .map(|&index| value_at(batch.column(index).as_ref(), row))
                    .collect::<Result<Row>>()?;
                keyed.push((sort_key, values));
            }
        }

        if !order.is_empty() {
            keyed.sort_by(|(a, _), (b, _)| {
                for ((left, right), (_, descending)) in a.iter().zip(b).zip(&order) {
                    let ord = compare(left, right);
                    if ord != Ordering::Equal {
                        return if *descending { ord.reverse() } else { ord };
                    }
                }
                Ordering::Equal
            });
        }

        let rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(QueryResult::new(Schema::new(fields), rows))
    }

    fn cancel_query(&self) -> Result<()> {
        self.cancels.fetch_add(1, AtomicOrdering::Relaxed);
        self.cancelled.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }
}

fn qualified_name(schema_name: Option<&str>, table_name: &str) -> String {
    match schema_name {
        Some(schema) if !schema.is_empty() => format!("{}.{}", schema, table_name),
        _ => table_name.to_string(),
    }
}

/// `col [ASC|DESC], ...` into (column index, descending) pairs.
fn parse_order_by(clause: &str, table: &MemoryTable) -> Result<Vec<(usize, bool)>> {
    clause
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let mut parts = item.split_whitespace();
            let column = parts.next().unwrap_or_default();
            let descending = match parts.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => false,
                Some("DESC") => true,
                Some(other) => {
                    return Err(LookupError::Database(format!(
                        "Unsupported ORDER BY direction '{}'",
                        other
                    )))
                }
            };
            let (index, _) = table.column(column)?;
            Ok((index, descending))
        })
        .collect()
}

fn sql_matches(operator: Operator, value: &Value, operands: &[Value]) -> bool {
    match operator {
        Operator::IsNull => value.is_null(),
        Operator::IsNotNull => !value.is_null(),
        _ if value.is_null() || operands.iter().any(Value::is_null) => false,
        Operator::Like => operands
            .first()
            .map_or(false, |pattern| like_match(&value.to_string(), &pattern.to_string())),
        op => op.matches(value, operands).unwrap_or(false),
    }
}

/// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // position of the last `%` and the text index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_core::DataType;
    use lookup_step::{ConditionClause, SelectColumn};

    fn people() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("age", DataType::Int64, true),
        ]);
        let rows = vec![
            vec![Value::Int64(1), Value::from("alice"), Value::Int64(30)],
            vec![Value::Int64(2), Value::from("bob"), Value::Null],
            vec![Value::Int64(3), Value::from("charlie"), Value::Int64(25)],
            vec![Value::Int64(4), Value::Null, Value::Int64(41)],
        ];
        db.register_rows("crm.people", &schema, &rows).unwrap();
        db
    }

    fn lookup(conditions: Vec<(&str, Operator)>, returns: &[&str]) -> LookupStatement {
        LookupStatement {
            schema_name: Some("crm".into()),
            table_name: "people".into(),
            returns: returns
                .iter()
                .map(|c| SelectColumn {
                    column: c.to_string(),
                    alias: None,
                })
                .collect(),
            conditions: conditions
                .into_iter()
                .map(|(column, operator)| ConditionClause {
                    column: column.to_string(),
                    operator,
                })
                .collect(),
            max_rows: 1,
        }
    }

    #[test]
    fn test_describe_is_case_insensitive_and_qualified() {
        let db = people();
        assert_eq!(db.describe_table(Some("CRM"), "People").unwrap().len(), 3);
        assert!(matches!(
            db.describe_table(None, "people"),
            Err(LookupError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_equality_lookup() {
        let db = people();
        let result = db
            .query(&lookup(vec![("id", Operator::Eq)], &["name"]), &[Value::Int64(3)])
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("charlie")]]);
        assert_eq!(db.query_count(), 1);
    }

    #[test]
    fn test_null_comparisons_never_match() {
        let db = people();
        let result = db
            .query(&lookup(vec![("age", Operator::Lt)], &["id"]), &[Value::Int64(100)])
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int64(1)]]);

        let result = db
            .query(&lookup(vec![("name", Operator::Eq)], &["id"]), &[Value::Null])
            .unwrap();
        assert!(result.is_empty());

        let result = db
            .query(&lookup(vec![("age", Operator::IsNull)], &["id"]), &[])
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int64(2)]]);
    }

    #[test]
    fn test_between_and_max_rows() {
        let db = people();
        let mut statement = lookup(vec![("age", Operator::Between)], &["name"]);
        statement.max_rows = 2;
        let result = db
            .query(&statement, &[Value::Int64(20), Value::Int64(40)])
            .unwrap();
        assert_eq!(
            result.rows,
            vec![vec![Value::from("alice")], vec![Value::from("charlie")]]
        );
    }

    #[test]
    fn test_like_lookup() {
        let db = people();
        let result = db
            .query(&lookup(vec![("name", Operator::Like)], &["id"]), &[Value::from("%ar_ie")])
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int64(3)]]);
    }

    #[test]
    fn test_parameter_count_checked() {
        let db = people();
        let result = db.query(&lookup(vec![("id", Operator::Eq)], &["name"]), &[]);
        assert!(matches!(result, Err(LookupError::Database(_))));
    }

    #[test]
    fn test_bulk_select_order_by() {
        let db = people();
        let statement = BulkStatement {
            schema_name: Some("crm".into()),
            table_name: "people".into(),
            key_columns: vec!["id".into()],
            return_columns: vec!["name".into()],
            order_by: Some("age DESC".into()),
        };
        let result = db.bulk_select(&statement).unwrap();

        let ids: Vec<Value> = result.rows.iter().map(|r| r[0].clone()).collect();
        // NULL sorts first ascending, so last descending
        assert_eq!(
            ids,
            vec![Value::Int64(4), Value::Int64(1), Value::Int64(3), Value::Int64(2)]
        );
        assert_eq!(result.schema.fields()[1].name(), "name");
        assert_eq!(db.bulk_select_count(), 1);
    }

    #[test]
    fn test_bulk_select_rejects_unknown_order_column() {
        let db = people();
        let statement = BulkStatement {
            schema_name: Some("crm".into()),
            table_name: "people".into(),
            key_columns: vec!["id".into()],
            return_columns: vec![],
            order_by: Some("height".into()),
        };
        assert!(db.bulk_select(&statement).is_err());
    }

    #[test]
    fn test_cancel_and_disconnect() {
        let db = people();
        let statement = lookup(vec![("id", Operator::Eq)], &["name"]);

        db.cancel_query().unwrap();
        assert!(matches!(
            db.query(&statement, &[Value::Int64(1)]),
            Err(LookupError::Cancelled)
        ));
        assert_eq!(db.cancel_count(), 1);

        db.reconnect();
        assert!(db.query(&statement, &[Value::Int64(1)]).is_ok());

        db.disconnect().unwrap();
        assert!(!db.is_connected());
        assert!(matches!(
            db.query(&statement, &[Value::Int64(1)]),
            Err(LookupError::Database(_))
        ));
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("charlie", "c%"));
        assert!(like_match("charlie", "%lie"));
        assert!(like_match("charlie", "ch_rl%"));
        assert!(like_match("", "%"));
        assert!(like_match("abc", "a%%c"));
        assert!(!like_match("charlie", "c_"));
        assert!(!like_match("abc", "abcd"));
        assert!(!like_match("abc", "%d%"));
    }
}
