use crate::config::{Config, OutputFormat};
use anyhow::{Context, Result};
use arrow::json::LineDelimitedWriter;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use lookup_cache::CacheStats;
use lookup_core::array::rows_to_batch;
use lookup_core::{Row, Schema};
use lookup_step::{
    BulkStatement, CollectingSink, Database, ErrorDescriptor, LookupMeta, LookupStatement,
    LookupStep, LookupStrategy, StepCounters,
};
use lookup_storage::{write_csv, CsvRowSource, MemoryDatabase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub fn run_lookup(config: &Config, step_file: &Path, tables: &[String], input: &Path) -> Result<()> {
    let meta = load_step(step_file)?;

    let database = Arc::new(MemoryDatabase::new());
    for spec in tables {
        let (name, path) = parse_table_arg(spec)?;
        register_table(&database, &name, &path)?;
    }

    if !input.exists() {
        anyhow::bail!("Input file not found: {:?}", input);
    }
    let mut source =
        CsvRowSource::open(input).with_context(|| format!("Could not read input {:?}", input))?;
    let mut sink = CollectingSink::new();

    eprintln!(
        "{} Looking up {} for each row of {:?}",
        "→".bright_blue(),
        meta.qualified_table().bright_cyan(),
        input
    );

    let start = Instant::now();
    let mut step = LookupStep::new(meta, database.clone());
    let result = step.run(&mut source, &mut sink);
    let output_schema = step.output_schema().cloned();
    let stats = step.cache_stats();
    let strategy = step.strategy();
    step.dispose()?;
    let counters = result?;
    let elapsed = start.elapsed();

    info!(
        queries = database.query_count(),
        bulk_selects = database.bulk_select_count(),
        "Lookup run complete"
    );

    let (rows, errors) = sink.into_parts();
    let output_schema = output_schema.unwrap_or_else(Schema::empty);
    print_rows(config, &output_schema, &rows)?;

    if !errors.is_empty() {
        print_errors(&errors);
    }

    eprintln!(
        "{} {} rows written, {} rejected, {} dropped",
        "✓".bright_green(),
        counters.lines_written,
        counters.lines_rejected,
        counters.lines_dropped
    );
    if config.show_stats {
        print_stats(&counters, strategy, stats.as_deref(), &database);
    }
    if config.show_timing {
        eprintln!(
            "{} {:.2}ms",
            "Run time:".bright_yellow(),
            elapsed.as_secs_f64() * 1000.0
        );
    }

    Ok(())
}

pub fn describe_table(spec: &str) -> Result<()> {
    let (name, path) = parse_table_arg(spec)?;
    let database = MemoryDatabase::new();
    register_table(&database, &name, &path)?;

    let schema = database.describe_table(None, &name)?;
    println!(
        "{} {}",
        "Table:".bright_yellow(),
        name.bright_cyan().bold()
    );
    println!();

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Column").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Yellow),
        Cell::new("Nullable").fg(Color::Green),
    ]);
    for field in schema.fields() {
        table.add_row(vec![
            field.name(),
            &field.data_type().to_string(),
            if field.nullable() { "YES" } else { "NO" },
        ]);
    }
    println!("{}", table);

    Ok(())
}

pub fn validate_step(step_file: &Path) -> Result<()> {
    let meta = load_step(step_file)?;
    let strategy = LookupStrategy::classify(meta.keys.iter().map(|k| k.condition.operator()));

    println!(
        "{} Step configuration for {} is valid",
        "✓".bright_green(),
        meta.qualified_table().bright_cyan()
    );
    println!();

    let mut keys = ComfyTable::new();
    keys.set_header(vec![
        Cell::new("Table Column").fg(Color::Cyan),
        Cell::new("Condition").fg(Color::Yellow),
        Cell::new("Stream Fields").fg(Color::Green),
    ]);
    for key in &meta.keys {
        let fields: Vec<&str> = key.condition.fields().into_iter().map(String::as_str).collect();
        keys.add_row(vec![
            key.table_column.as_str(),
            &key.condition.operator().to_string(),
            &fields.join(", "),
        ]);
    }
    println!("{}", keys);

    let mut returns = ComfyTable::new();
    returns.set_header(vec![
        Cell::new("Table Column").fg(Color::Cyan),
        Cell::new("Output").fg(Color::Yellow),
        Cell::new("Default").fg(Color::Green),
    ]);
    for ret in &meta.returns {
        returns.add_row(vec![
            ret.table_column.as_str(),
            ret.output_name(),
            ret.default.as_deref().unwrap_or(""),
        ]);
    }
    println!("{}", returns);
    println!();

    println!("{} {}", "Strategy:".bright_yellow(), strategy);
    println!(
        "{} {}",
        "Lookup:".bright_yellow(),
        LookupStatement::from_meta(&meta).to_string().bright_white()
    );
    if meta.cache.enabled && meta.cache.load_all {
        println!(
            "{} {}",
            "Bulk load:".bright_yellow(),
            BulkStatement::from_meta(&meta).to_string().bright_white()
        );
    }

    Ok(())
}

fn load_step(path: &Path) -> Result<LookupMeta> {
    if !path.exists() {
        anyhow::bail!("Step configuration not found: {:?}", path);
    }
    let meta = LookupMeta::from_json_file(path)
        .with_context(|| format!("Invalid step configuration {:?}", path))?;
    meta.validate()?;
    Ok(meta)
}

fn register_table(database: &MemoryDatabase, name: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {:?}", path);
    }
    let schema = database
        .register_csv(name, path)
        .with_context(|| format!("Could not load table '{}' from {:?}", name, path))?;
    eprintln!(
        "{} Loaded table '{}' ({} columns)",
        "→".bright_blue(),
        name.bright_cyan(),
        schema.len()
    );
    Ok(())
}

/// Split a `name=path` table argument.
fn parse_table_arg(spec: &str) -> Result<(String, PathBuf)> {
    match spec.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => anyhow::bail!("Invalid table '{}', expected name=path.csv", spec),
    }
}

fn print_rows(config: &Config, schema: &Schema, rows: &[Row]) -> Result<()> {
    match config.output_format {
        OutputFormat::Table => {
            println!("{}", render_table(schema, rows, config.max_rows));
            if config.max_rows > 0 && rows.len() > config.max_rows {
                println!(
                    "{}",
                    format!("... {} more rows", rows.len() - config.max_rows).bright_black()
                );
            }
        }
        OutputFormat::Json => {
            let batch = rows_to_batch(schema, rows)?;
            let mut writer = LineDelimitedWriter::new(std::io::stdout());
            writer.write(&batch)?;
            writer.finish()?;
        }
        OutputFormat::Csv => {
            write_csv(std::io::stdout(), schema, rows)?;
        }
    }
    Ok(())
}

fn render_table(schema: &Schema, rows: &[Row], max_rows: usize) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(
        schema
            .fields()
            .iter()
            .map(|f| Cell::new(f.name()).fg(Color::Cyan)),
    );

    let limit = if max_rows == 0 { rows.len() } else { max_rows };
    for row in rows.iter().take(limit) {
        table.add_row(row.iter().map(|v| v.to_string()));
    }
    table
}

fn print_errors(errors: &[(Row, ErrorDescriptor)]) {
    eprintln!();
    eprintln!("{}", "Error Rows".bright_red().bold());

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Row").fg(Color::Cyan),
        Cell::new("Code").fg(Color::Yellow),
        Cell::new("Message").fg(Color::Red),
    ]);
    for (row, error) in errors {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        table.add_row(vec![values.join(", "), error.code.clone(), error.message.clone()]);
    }
    eprintln!("{}", table);
}

fn print_stats(
    counters: &StepCounters,
    strategy: Option<LookupStrategy>,
    stats: Option<&CacheStats>,
    database: &MemoryDatabase,
) {
    eprintln!();
    eprintln!("{}", "Lookup Statistics".bright_yellow().bold());

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Metric").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Green),
    ]);

    if let Some(strategy) = strategy {
        table.add_row(vec!["Strategy".to_string(), strategy.to_string()]);
    }
    table.add_row(vec!["Rows Read".to_string(), counters.lines_read.to_string()]);
    table.add_row(vec![
        "Rows From Database".to_string(),
        counters.lines_input.to_string(),
    ]);
    table.add_row(vec![
        "Queries".to_string(),
        database.query_count().to_string(),
    ]);
    match stats {
        Some(stats) => {
            table.add_row(vec!["Cache Entries".to_string(), stats.entry_count().to_string()]);
            table.add_row(vec!["Cache Hits".to_string(), stats.hits().to_string()]);
            table.add_row(vec!["Cache Misses".to_string(), stats.misses().to_string()]);
            table.add_row(vec![
                "Hit Rate".to_string(),
                format!("{:.1}%", stats.hit_rate() * 100.0),
            ]);
            table.add_row(vec!["Evictions".to_string(), stats.evictions().to_string()]);
        }
        None => {
            table.add_row(vec!["Cache".to_string(), "disabled".to_string()]);
        }
    }

    eprintln!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_core::{DataType, Field, Value};

    #[test]
    fn test_parse_table_arg() {
        let (name, path) = parse_table_arg("customers=data/customers.csv").unwrap();
        assert_eq!(name, "customers");
        assert_eq!(path, PathBuf::from("data/customers.csv"));

        assert!(parse_table_arg("customers").is_err());
        assert!(parse_table_arg("=x.csv").is_err());
        assert!(parse_table_arg("t=").is_err());
    }

    #[test]
    fn test_render_table_limits_rows() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let rows: Vec<Row> = (0..5).map(|i| vec![Value::Int64(i)]).collect();

        let table = render_table(&schema, &rows, 2);
        assert_eq!(table.row_iter().count(), 2);

        let table = render_table(&schema, &rows, 0);
        assert_eq!(table.row_iter().count(), 5);
    }
}
