//! Customer Lookup Example
//!
//! Enriches a stream of orders with customer names, showing the three ways
//! a missed lookup can be handled.

use anyhow::Result;
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use lookup_cache::CacheConfig;
use lookup_core::{DataType, Field, Schema, Value};
use lookup_step::{CollectingSink, KeyCondition, LookupMeta, LookupStep, ReturnSpec, VecRowSource};
use lookup_storage::MemoryDatabase;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Customer Lookup Example ===\n");

    let database = Arc::new(customers()?);

    // Example 1: misses filled with defaults
    with_defaults(database.clone())?;

    // Example 2: misses dropped
    eat_rows(database.clone())?;

    // Example 3: misses sent to the error stream
    error_stream(database.clone())?;

    println!("\n=== All lookup examples completed! ===");
    Ok(())
}

fn customers() -> Result<MemoryDatabase> {
    let schema = Arc::new(ArrowSchema::new(vec![
        ArrowField::new("id", ArrowDataType::Int64, false),
        ArrowField::new("name", ArrowDataType::Utf8, false),
        ArrowField::new("country", ArrowDataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec!["Alice", "Bob", "Charlie"])),
            Arc::new(StringArray::from(vec![Some("NL"), None, Some("BE")])),
        ],
    )?;

    let database = MemoryDatabase::new();
    database.register_batches("sales.customers", vec![batch])?;
    Ok(database)
}

fn orders() -> VecRowSource {
    let schema = Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("customer_id", DataType::Utf8, true),
    ]);
    // customer ids arrive as text and are coerced to the key column type
    let rows = vec![
        vec![Value::Int64(100), Value::from("1")],
        vec![Value::Int64(101), Value::from("3")],
        vec![Value::Int64(102), Value::from("9")],
        vec![Value::Int64(103), Value::from("1")],
    ];
    VecRowSource::new(schema, rows)
}

fn meta() -> LookupMeta {
    LookupMeta::new("customers")
        .with_schema("sales")
        .with_key("id", KeyCondition::eq("customer_id"))
        .with_return(ReturnSpec::new("name").with_rename("customer_name"))
        .with_return(ReturnSpec::new("country").with_default("??"))
        .with_cache(CacheConfig::new(100))
}

fn print_rows(sink: &CollectingSink) {
    for row in sink.rows() {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("  {}", values.join(" | "));
    }
}

/// Example 1: defaults substituted on a miss
fn with_defaults(database: Arc<MemoryDatabase>) -> Result<()> {
    println!("--- Example 1: Defaults ---\n");

    let mut step = LookupStep::new(meta(), database.clone());
    let mut sink = CollectingSink::new();
    let before = database.query_count();
    let counters = step.run(&mut orders(), &mut sink)?;

    if let Some(schema) = step.output_schema() {
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name()).collect();
        println!("  {}", names.join(" | "));
    }
    print_rows(&sink);
    println!(
        "\n  {} rows written, {} queries, {} cache hits",
        counters.lines_written,
        database.query_count() - before,
        step.cache_stats().map_or(0, |s| s.hits())
    );

    Ok(())
}

/// Example 2: rows without a customer are dropped
fn eat_rows(database: Arc<MemoryDatabase>) -> Result<()> {
    println!("\n--- Example 2: Eat Row ---\n");

    let mut step = LookupStep::new(meta().with_eat_row_on_failure(true), database);
    let mut sink = CollectingSink::new();
    let counters = step.run(&mut orders(), &mut sink)?;

    print_rows(&sink);
    println!("\n  {} rows dropped", counters.lines_dropped);

    Ok(())
}

/// Example 3: rows without a customer go to the error stream
fn error_stream(database: Arc<MemoryDatabase>) -> Result<()> {
    println!("\n--- Example 3: Error Stream ---\n");

    let mut step = LookupStep::new(meta().with_error_handling(true), database);
    let mut sink = CollectingSink::new();
    step.run(&mut orders(), &mut sink)?;

    print_rows(&sink);
    for (row, error) in sink.errors() {
        println!(
            "  rejected order {}: {} ({})",
            row[0], error.message, error.code
        );
    }

    Ok(())
}
