//! End-to-end lookups against the in-memory database

use lookup_cache::CacheConfig;
use lookup_core::{DataType, Field, Schema, Value, ERROR_CODE_NO_LOOKUP, ERROR_CODE_ROW_FAILURE};
use lookup_step::{
    CollectingSink, KeyCondition, LookupMeta, LookupStep, LookupStrategy, ReturnSpec, StepState,
    VecRowSource,
};
use lookup_storage::{write_csv, CsvRowSource, MemoryDatabase};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn people() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    db.register_rows(
        "T",
        &schema,
        &[
            vec![Value::Int64(1), Value::from("a")],
            vec![Value::Int64(2), Value::from("b")],
            vec![Value::Int64(3), Value::from("c")],
        ],
    )
    .unwrap();
    Arc::new(db)
}

fn ids(values: &[i64]) -> VecRowSource {
    VecRowSource::new(
        Schema::new(vec![Field::new("inId", DataType::Int64, true)]),
        values.iter().map(|&v| vec![Value::Int64(v)]).collect(),
    )
}

fn name_by_id() -> LookupMeta {
    LookupMeta::new("T")
        .with_key("id", KeyCondition::eq("inId"))
        .with_return(ReturnSpec::new("name"))
}

fn names(sink: &CollectingSink) -> Vec<Value> {
    sink.rows().iter().map(|row| row[1].clone()).collect()
}

#[test]
fn test_small_cache_requeries_evicted_key() {
    let db = people();
    let meta = LookupMeta::new("T")
        .with_key("id", KeyCondition::eq("inId"))
        .with_return(ReturnSpec::new("name").with_rename("outName"))
        .with_cache(CacheConfig::new(2));
    let mut step = LookupStep::new(meta, db.clone());
    let mut sink = CollectingSink::new();

    let counters = step.run(&mut ids(&[1, 2, 3, 1]), &mut sink).unwrap();

    assert_eq!(
        names(&sink),
        vec![
            Value::from("a"),
            Value::from("b"),
            Value::from("c"),
            Value::from("a")
        ]
    );
    // the third insert pushed key 1 out
    assert_eq!(db.query_count(), 4);
    assert_eq!(counters.lines_read, 4);
    assert_eq!(counters.lines_written, 4);
    assert_eq!(step.cache_len(), 2);
    assert!(sink.errors().is_empty());
    assert_eq!(step.output_schema().unwrap().fields()[1].name(), "outName");
}

#[test]
fn test_repeated_keys_answered_from_cache() {
    let db = people();
    let mut step = LookupStep::new(name_by_id().with_cache(CacheConfig::new(0)), db.clone());
    let mut sink = CollectingSink::new();

    step.run(&mut ids(&[2, 2, 2, 3, 2]), &mut sink).unwrap();

    assert_eq!(db.query_count(), 2);
    let stats = step.cache_stats().unwrap();
    assert_eq!(stats.hits(), 3);
    assert_eq!(sink.rows()[4], vec![Value::Int64(2), Value::from("b")]);
}

#[test]
fn test_without_cache_every_row_queries() {
    let db = people();
    let mut step = LookupStep::new(name_by_id(), db.clone());
    let mut sink = CollectingSink::new();

    step.run(&mut ids(&[1, 1, 1]), &mut sink).unwrap();

    assert_eq!(db.query_count(), 3);
    assert!(step.cache_stats().is_none());
}

#[test]
fn test_miss_completed_with_defaults() {
    let db = people();
    let meta = LookupMeta::new("T")
        .with_key("id", KeyCondition::eq("inId"))
        .with_return(ReturnSpec::new("name").with_rename("customer").with_default("unknown"))
        .with_cache(CacheConfig::new(0));
    let mut step = LookupStep::new(meta, db.clone());
    let mut sink = CollectingSink::new();

    step.run(&mut ids(&[9, 9, 1]), &mut sink).unwrap();

    assert_eq!(
        names(&sink),
        vec![Value::from("unknown"), Value::from("unknown"), Value::from("a")]
    );
    // the second miss is served by the remembered default
    assert_eq!(db.query_count(), 2);
    let output = sink.output_schema().unwrap();
    assert_eq!(output.fields()[1].name(), "customer");
}

#[test]
fn test_miss_eats_row() {
    let db = people();
    let mut step = LookupStep::new(name_by_id().with_eat_row_on_failure(true), db);
    let mut sink = CollectingSink::new();

    let counters = step.run(&mut ids(&[1, 7, 2]), &mut sink).unwrap();

    assert_eq!(names(&sink), vec![Value::from("a"), Value::from("b")]);
    assert!(sink.errors().is_empty());
    assert_eq!(counters.lines_dropped, 1);
}

#[test]
fn test_miss_routed_to_error_stream() {
    let db = people();
    let mut step = LookupStep::new(name_by_id().with_error_handling(true), db);
    let mut sink = CollectingSink::new();

    let counters = step.run(&mut ids(&[7, 3]), &mut sink).unwrap();

    assert_eq!(names(&sink), vec![Value::from("c")]);
    let (row, error) = &sink.errors()[0];
    assert_eq!(row, &vec![Value::Int64(7)]);
    assert_eq!(error.code, ERROR_CODE_NO_LOOKUP);
    assert_eq!(error.message, "No lookup found");
    assert_eq!(counters.lines_rejected, 1);
}

#[test]
fn test_like_key_bypasses_cache() {
    let db = people();
    let meta = LookupMeta::new("T")
        .with_key("name", KeyCondition::like("pattern"))
        .with_return(ReturnSpec::new("id"))
        .with_cache(CacheConfig::new(0));
    let mut step = LookupStep::new(meta, db.clone());
    let mut source = VecRowSource::new(
        Schema::new(vec![Field::new("pattern", DataType::Utf8, true)]),
        vec![vec![Value::from("b%")], vec![Value::from("b%")]],
    );
    let mut sink = CollectingSink::new();

    step.run(&mut source, &mut sink).unwrap();

    assert_eq!(step.strategy(), Some(LookupStrategy::DatabaseOnly));
    assert_eq!(db.query_count(), 2);
    assert_eq!(step.cache_len(), 0);
    assert_eq!(sink.rows()[1], vec![Value::from("b%"), Value::Int64(2)]);
}

#[test]
fn test_bulk_loaded_cache_never_queries() {
    let db = people();
    let meta = name_by_id()
        .with_error_handling(true)
        .with_cache(CacheConfig::new(1).with_load_all(true));
    let mut step = LookupStep::new(meta, db.clone());
    let mut sink = CollectingSink::new();

    step.run(&mut ids(&[3, 1, 8, 2]), &mut sink).unwrap();

    assert_eq!(db.bulk_select_count(), 1);
    assert_eq!(db.query_count(), 0);
    assert_eq!(step.cache_len(), 3);
    assert_eq!(
        names(&sink),
        vec![Value::from("c"), Value::from("a"), Value::from("b")]
    );
    assert_eq!(sink.errors().len(), 1);
}

#[test]
fn test_bulk_order_decides_first_range_match() {
    let run = |order_by: &str| {
        let db = people();
        let meta = LookupMeta::new("T")
            .with_key("id", KeyCondition::gt("inId"))
            .with_return(ReturnSpec::new("name"))
            .with_order_by(order_by)
            .with_cache(CacheConfig::new(0).with_load_all(true));
        let mut step = LookupStep::new(meta, db.clone());
        let mut sink = CollectingSink::new();
        step.run(&mut ids(&[1]), &mut sink).unwrap();
        assert_eq!(db.query_count(), 0);
        names(&sink)
    };

    assert_eq!(run("id"), vec![Value::from("b")]);
    assert_eq!(run("id DESC"), vec![Value::from("c")]);
}

#[test]
fn test_between_lookup() {
    let db = people();
    let meta = LookupMeta::new("T")
        .with_key("id", KeyCondition::between("low", "high"))
        .with_return(ReturnSpec::new("name"))
        .with_cache(CacheConfig::new(0));
    let mut step = LookupStep::new(meta, db.clone());
    let mut source = VecRowSource::new(
        Schema::new(vec![
            Field::new("low", DataType::Int64, true),
            Field::new("high", DataType::Int64, true),
        ]),
        vec![vec![Value::Int64(2), Value::Int64(5)]],
    );
    let mut sink = CollectingSink::new();

    step.run(&mut source, &mut sink).unwrap();

    assert_eq!(step.strategy(), Some(LookupStrategy::Conditional));
    assert_eq!(sink.rows()[0][2], Value::from("b"));
    assert_eq!(db.query_count(), 1);
}

#[test]
fn test_multiple_results_rejected() {
    let db = MemoryDatabase::new();
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    db.register_rows(
        "dup",
        &schema,
        &[
            vec![Value::Int64(1), Value::from("x")],
            vec![Value::Int64(1), Value::from("y")],
        ],
    )
    .unwrap();
    let meta = LookupMeta::new("dup")
        .with_key("id", KeyCondition::eq("inId"))
        .with_return(ReturnSpec::new("name"))
        .with_fail_on_multiple_results(true)
        .with_error_handling(true);
    let mut step = LookupStep::new(meta, Arc::new(db));
    let mut sink = CollectingSink::new();

    step.run(&mut ids(&[1]), &mut sink).unwrap();

    assert!(sink.rows().is_empty());
    assert_eq!(sink.errors()[0].1.code, ERROR_CODE_ROW_FAILURE);
}

#[test]
fn test_stop_before_run_cancels_once() {
    let db = people();
    let mut step = LookupStep::new(name_by_id(), db.clone());
    let handle = step.stop_handle();

    handle.stop().unwrap();
    handle.stop().unwrap();
    let counters = step.run(&mut ids(&[1, 2]), &mut CollectingSink::new()).unwrap();

    assert!(handle.is_stopped());
    assert_eq!(db.cancel_count(), 1);
    assert_eq!(counters.lines_read, 0);
}

#[test]
fn test_dispose_disconnects() {
    let db = people();
    let mut step = LookupStep::new(name_by_id().with_cache(CacheConfig::new(0)), db.clone());
    step.run(&mut ids(&[1]), &mut CollectingSink::new()).unwrap();

    step.dispose().unwrap();
    step.dispose().unwrap();

    assert_eq!(step.state(), StepState::Disposed);
    assert!(!db.is_connected());
    assert_eq!(step.cache_len(), 0);
}

#[test]
fn test_unknown_table_fails_init() {
    let db = people();
    let mut step = LookupStep::new(
        LookupMeta::new("missing")
            .with_key("id", KeyCondition::eq("inId"))
            .with_return(ReturnSpec::new("name")),
        db,
    );

    assert!(step.run(&mut ids(&[1]), &mut CollectingSink::new()).is_err());
    assert_eq!(step.state(), StepState::Failed);
}

#[test]
fn test_csv_table_and_csv_input() {
    let mut table = NamedTempFile::new().unwrap();
    table.write_all(b"id,name\n1,alice\n2,bob\n").unwrap();
    table.flush().unwrap();
    let mut input = NamedTempFile::new().unwrap();
    input.write_all(b"inId\n2\n5\n").unwrap();
    input.flush().unwrap();

    let db = MemoryDatabase::new();
    db.register_csv("customers", table.path()).unwrap();
    let meta = LookupMeta::new("customers")
        .with_key("id", KeyCondition::eq("inId"))
        .with_return(ReturnSpec::new("name").with_default("unknown"))
        .with_cache(CacheConfig::new(100));
    let mut step = LookupStep::new(meta, Arc::new(db));
    let mut source = CsvRowSource::open(input.path()).unwrap();
    let mut sink = CollectingSink::new();

    step.run(&mut source, &mut sink).unwrap();

    let mut out = Vec::new();
    write_csv(&mut out, step.output_schema().unwrap(), sink.rows()).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "inId,name\n2,bob\n5,unknown\n"
    );
}
