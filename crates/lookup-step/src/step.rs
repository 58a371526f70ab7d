//! The lookup step
//!
//! [`LookupStep`] appends values fetched from a database table to every
//! input row. Lookups go through a [`LookupCache`] when caching is enabled;
//! rows whose lookup misses are dropped, rejected to the error stream, or
//! completed with configured defaults.
//!
//! Lifecycle: `Uninitialized → Initializing → Ready → Disposed`, with
//! `Failed` as the terminal state of an aborted initialization.

use crate::bulk::BulkLoader;
use crate::condition::{ConditionEvaluator, KeyCondition, LookupStrategy};
use crate::database::{BulkStatement, Database, LookupStatement};
use crate::meta::{LookupMeta, ReturnSpec};
use crate::stream::{ErrorDescriptor, RowSink, RowSource};
use lookup_cache::{CacheStats, LookupCache, RowKey};
use lookup_core::convert::{convert, parse_literal};
use lookup_core::{
    DataType, Field, LookupError, Result, Row, Schema, Value, ERROR_CODE_NO_LOOKUP,
    ERROR_CODE_ROW_FAILURE,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const NO_LOOKUP_MESSAGE: &str = "No lookup found";

const MULTIPLE_RESULTS_MESSAGE: &str =
    "Only 1 row was expected as a result of a lookup, and at least 2 were found!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Disposed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Uninitialized => "uninitialized",
            StepState::Initializing => "initializing",
            StepState::Ready => "ready",
            StepState::Failed => "failed",
            StepState::Disposed => "disposed",
        };
        write!(f, "{}", name)
    }
}

/// Result of a lookup. A miss is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(Vec<Value>),
    Miss,
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }

    pub fn values(&self) -> Option<&[Value]> {
        match self {
            LookupOutcome::Found(values) => Some(values),
            LookupOutcome::Miss => None,
        }
    }
}

/// What happened to one input row
#[derive(Debug, Clone, PartialEq)]
pub enum RowResult {
    /// Input row with the return values appended
    Output(Row),
    /// Unchanged input row for the error stream
    Error(Row, ErrorDescriptor),
    /// Row consumed without output
    Dropped,
}

/// Row counters of one step instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounters {
    pub lines_read: u64,
    pub lines_written: u64,
    /// Rows fetched from the database by per-row lookups
    pub lines_input: u64,
    pub lines_rejected: u64,
    pub lines_dropped: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    cancelled: AtomicBool,
}

/// Stops a running step from another thread.
///
/// The first `stop()` also cancels the query the step may be waiting on;
/// later calls do nothing.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<StopState>,
    database: Arc<dyn Database>,
}

impl StopHandle {
    fn new(database: Arc<dyn Database>) -> Self {
        Self {
            state: Arc::new(StopState::default()),
            database,
        }
    }

    pub fn stop(&self) -> Result<()> {
        self.state.stopped.store(true, Ordering::SeqCst);
        if self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("Cancelling lookup query");
            self.database.cancel_query()?;
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }
}

/// Everything resolved by `init`.
#[derive(Debug)]
struct Runtime {
    input_schema: Schema,
    output_schema: Schema,
    keys: Vec<KeyCondition<usize>>,
    /// Table column type of every lookup key slot
    slot_types: Vec<DataType>,
    return_types: Vec<DataType>,
    defaults: Vec<Value>,
    evaluator: ConditionEvaluator,
    cache: Option<LookupCache>,
    statement: LookupStatement,
}

impl Runtime {
    fn build_key(&self, row: &Row) -> Result<RowKey> {
        let offsets = self
            .keys
            .iter()
            .flat_map(|condition| condition.fields().into_iter().copied());

        let values = offsets
            .zip(&self.slot_types)
            .map(|(offset, ty)| {
                let value = row.get(offset).ok_or_else(|| {
                    LookupError::InvalidState(format!(
                        "Input row has {} values, key field offset {} is out of range",
                        row.len(),
                        offset
                    ))
                })?;
                convert(value, *ty)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RowKey::new(values))
    }

    /// Convert values whose type differs from the declared return type.
    fn reconcile(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        values
            .into_iter()
            .zip(&self.return_types)
            .map(|(value, ty)| {
                if value.is_null() || value.data_type() == *ty {
                    Ok(value)
                } else {
                    convert(&value, *ty)
                }
            })
            .collect()
    }

    fn caches_database_results(&self) -> bool {
        self.evaluator.strategy() == LookupStrategy::AllEquals
            && matches!(&self.cache, Some(cache) if !cache.is_bulk_loaded())
    }
}

struct Resolution {
    outcome: LookupOutcome,
    key: RowKey,
    from_database: bool,
}

/// Caching database lookup over a row stream
pub struct LookupStep {
    meta: LookupMeta,
    database: Arc<dyn Database>,
    state: StepState,
    stop: StopHandle,
    runtime: Option<Runtime>,
    counters: StepCounters,
}

impl LookupStep {
    pub fn new(meta: LookupMeta, database: Arc<dyn Database>) -> Self {
        Self {
            stop: StopHandle::new(Arc::clone(&database)),
            meta,
            database,
            state: StepState::Uninitialized,
            runtime: None,
            counters: StepCounters::default(),
        }
    }

    /// Resolve the configuration against the table and the input layout,
    /// create the cache and optionally bulk-load it.
    pub fn init(&mut self, input_schema: &Schema) -> Result<()> {
        if self.state != StepState::Uninitialized {
            return Err(LookupError::InvalidState(format!(
                "Cannot initialize a lookup step that is {}",
                self.state
            )));
        }
        self.state = StepState::Initializing;

        match self.prepare(input_schema) {
            Ok(runtime) => {
                info!(
                    table = %self.meta.qualified_table(),
                    strategy = %runtime.evaluator.strategy(),
                    keys = runtime.keys.len(),
                    returns = runtime.return_types.len(),
                    cached = runtime.cache.is_some(),
                    "Lookup step initialized"
                );
                debug!(sql = %runtime.statement, "Prepared lookup statement");
                self.runtime = Some(runtime);
                self.state = StepState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(
                    table = %self.meta.qualified_table(),
                    error = %e,
                    "Lookup step initialization failed"
                );
                self.counters.errors += 1;
                self.state = StepState::Failed;
                Err(e)
            }
        }
    }

    fn prepare(&self, input_schema: &Schema) -> Result<Runtime> {
        self.meta.validate()?;

        let table = self
            .database
            .describe_table(self.meta.schema_name.as_deref(), &self.meta.table_name)?;

        let mut keys = Vec::with_capacity(self.meta.keys.len());
        let mut key_types = Vec::with_capacity(self.meta.keys.len());
        let mut slot_types = Vec::new();
        for spec in &self.meta.keys {
            let ty = *self.table_column(&table, &spec.table_column)?.data_type();
            let condition = spec.condition.try_map(|name| {
                input_schema.index_of(name).map_err(|_| {
                    LookupError::Configuration(format!(
                        "Field '{}' used by the lookup key on column '{}' is not in the input",
                        name, spec.table_column
                    ))
                })
            })?;
            slot_types.extend(std::iter::repeat(ty).take(condition.operator().arity()));
            key_types.push(ty);
            keys.push(condition);
        }

        let mut return_fields = Vec::with_capacity(self.meta.returns.len());
        let mut return_types = Vec::with_capacity(self.meta.returns.len());
        let mut defaults = Vec::with_capacity(self.meta.returns.len());
        for ret in &self.meta.returns {
            let ty = *self.table_column(&table, &ret.table_column)?.data_type();
            defaults.push(parse_default(ret, ty)?);
            return_fields.push(Field::new(ret.output_name(), ty, true));
            return_types.push(ty);
        }

        let evaluator = ConditionEvaluator::new(keys.iter().map(KeyCondition::operator).collect());

        let cache = if self.meta.cache.enabled {
            let mut cache = LookupCache::new(self.meta.cache.clone());
            if self.meta.cache.load_all {
                BulkLoader::new(self.database.as_ref(), &key_types, &return_types)
                    .load(&BulkStatement::from_meta(&self.meta), &mut cache)?;
            }
            Some(cache)
        } else {
            None
        };

        Ok(Runtime {
            input_schema: input_schema.clone(),
            output_schema: input_schema.join(&Schema::new(return_fields)),
            keys,
            slot_types,
            return_types,
            defaults,
            evaluator,
            cache,
            statement: LookupStatement::from_meta(&self.meta),
        })
    }

    fn table_column<'a>(&self, table: &'a Schema, name: &str) -> Result<&'a Field> {
        table.search(name).ok_or_else(|| {
            LookupError::ColumnNotFound(format!(
                "{} in table {}",
                name,
                self.meta.qualified_table()
            ))
        })
    }

    /// Resolve the return values for one input row.
    ///
    /// Database results are cached when every key condition is `=`, caching
    /// is enabled and the table was not bulk-loaded.
    pub fn lookup(&mut self, row: &Row) -> Result<LookupOutcome> {
        Ok(self.resolve(row)?.outcome)
    }

    fn resolve(&mut self, row: &Row) -> Result<Resolution> {
        let state = self.state;
        let runtime = self.runtime.as_mut().ok_or_else(|| not_ready(state))?;

        let key = runtime.build_key(row)?;
        let strategy = runtime.evaluator.strategy();

        if strategy.uses_cache() {
            if let Some(cache) = &runtime.cache {
                if let Some(values) = runtime.evaluator.find(cache, &key) {
                    return Ok(Resolution {
                        outcome: LookupOutcome::Found(values.to_vec()),
                        key,
                        from_database: false,
                    });
                }
                if cache.is_bulk_loaded() {
                    return Ok(Resolution {
                        outcome: LookupOutcome::Miss,
                        key,
                        from_database: false,
                    });
                }
            }
        }

        let result = self.database.query(&runtime.statement, key.values())?;
        if result.rows.len() > 1 && self.meta.fail_on_multiple_results {
            return Err(LookupError::Database(MULTIPLE_RESULTS_MESSAGE.to_string()));
        }

        let Some(mut first) = result.rows.into_iter().next() else {
            return Ok(Resolution {
                outcome: LookupOutcome::Miss,
                key,
                from_database: true,
            });
        };
        self.counters.lines_input += 1;

        let n_returns = runtime.return_types.len();
        if first.len() < n_returns {
            return Err(LookupError::Database(format!(
                "Lookup returned {} columns, expected {}",
                first.len(),
                n_returns
            )));
        }
        first.truncate(n_returns);
        let values = runtime.reconcile(first)?;

        if runtime.caches_database_results() {
            if let Some(cache) = runtime.cache.as_mut() {
                cache.put(key.clone(), values.clone());
            }
        }

        Ok(Resolution {
            outcome: LookupOutcome::Found(values),
            key,
            from_database: true,
        })
    }

    /// Process one input row.
    ///
    /// Row-level failures (conversion, database) become
    /// [`RowResult::Error`] when error handling is enabled and abort the
    /// step otherwise.
    pub fn process_row(&mut self, row: Row) -> Result<RowResult> {
        self.counters.lines_read += 1;

        match self.resolve(&row) {
            Ok(Resolution {
                outcome: LookupOutcome::Found(values),
                ..
            }) => Ok(self.emit(row, values)),
            Ok(Resolution {
                outcome: LookupOutcome::Miss,
                key,
                from_database,
            }) => self.on_miss(row, key, from_database),
            Err(e) => self.on_error(row, e),
        }
    }

    fn emit(&mut self, mut row: Row, values: Vec<Value>) -> RowResult {
        row.extend(values);
        self.counters.lines_written += 1;
        RowResult::Output(row)
    }

    fn on_miss(&mut self, row: Row, key: RowKey, from_database: bool) -> Result<RowResult> {
        debug!(key = %key, "No lookup found");

        if self.meta.eat_row_on_failure {
            self.counters.lines_dropped += 1;
            return Ok(RowResult::Dropped);
        }

        if self.meta.error_handling {
            self.counters.lines_rejected += 1;
            return Ok(RowResult::Error(
                row,
                ErrorDescriptor::new(NO_LOOKUP_MESSAGE, ERROR_CODE_NO_LOOKUP),
            ));
        }

        let state = self.state;
        let runtime = self.runtime.as_mut().ok_or_else(|| not_ready(state))?;
        let defaults = runtime.defaults.clone();
        // Misses answered by the database are remembered with their defaults.
        if from_database && runtime.caches_database_results() {
            if let Some(cache) = runtime.cache.as_mut() {
                cache.put(key, defaults.clone());
            }
        }

        Ok(self.emit(row, defaults))
    }

    fn on_error(&mut self, row: Row, error: LookupError) -> Result<RowResult> {
        if matches!(error, LookupError::Cancelled) && self.stop.is_stopped() {
            info!("Lookup query cancelled");
            return Err(error);
        }

        if self.meta.error_handling && error.is_row_level() {
            warn!(error = %error, "Sending row to the error stream");
            self.counters.lines_rejected += 1;
            return Ok(RowResult::Error(
                row,
                ErrorDescriptor::new(error.to_string(), ERROR_CODE_ROW_FAILURE),
            ));
        }

        error!(error = %error, "Lookup failed");
        self.counters.errors += 1;
        Err(error)
    }

    /// Read `source` to the end (or until stopped), writing results to
    /// `sink` in input order. Initializes the step first if needed.
    pub fn run(&mut self, source: &mut dyn RowSource, sink: &mut dyn RowSink) -> Result<StepCounters> {
        if self.state == StepState::Uninitialized {
            self.init(source.schema())?;
        }
        let state = self.state;
        let (input_schema, output_schema) = match &self.runtime {
            Some(runtime) => (runtime.input_schema.clone(), runtime.output_schema.clone()),
            None => return Err(not_ready(state)),
        };

        let start = Instant::now();
        while !self.stop.is_stopped() {
            let Some(row) = source.next_row()? else {
                break;
            };
            match self.process_row(row) {
                Ok(RowResult::Output(row)) => sink.put_row(&output_schema, row)?,
                Ok(RowResult::Error(row, descriptor)) => {
                    sink.put_error(&input_schema, row, descriptor)?
                }
                Ok(RowResult::Dropped) => {}
                Err(LookupError::Cancelled) if self.stop.is_stopped() => break,
                Err(e) => return Err(e),
            }
        }

        info!(
            read = self.counters.lines_read,
            written = self.counters.lines_written,
            from_database = self.counters.lines_input,
            rejected = self.counters.lines_rejected,
            dropped = self.counters.lines_dropped,
            stopped = self.stop.is_stopped(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Lookup step finished"
        );
        Ok(self.counters)
    }

    /// Release the cache and disconnect from the database. Safe to call
    /// more than once.
    pub fn dispose(&mut self) -> Result<()> {
        if self.state == StepState::Disposed {
            return Ok(());
        }
        if let Some(mut runtime) = self.runtime.take() {
            if let Some(cache) = runtime.cache.as_mut() {
                cache.clear();
            }
        }
        self.state = StepState::Disposed;
        debug!(table = %self.meta.qualified_table(), "Lookup step disposed");
        self.database.disconnect()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn counters(&self) -> StepCounters {
        self.counters
    }

    pub fn meta(&self) -> &LookupMeta {
        &self.meta
    }

    /// Input fields followed by the return fields; known after `init`.
    pub fn output_schema(&self) -> Option<&Schema> {
        self.runtime.as_ref().map(|r| &r.output_schema)
    }

    pub fn strategy(&self) -> Option<LookupStrategy> {
        self.runtime.as_ref().map(|r| r.evaluator.strategy())
    }

    pub fn cache_stats(&self) -> Option<Arc<CacheStats>> {
        self.runtime
            .as_ref()
            .and_then(|r| r.cache.as_ref())
            .map(LookupCache::stats)
    }

    pub fn cache_len(&self) -> usize {
        self.runtime
            .as_ref()
            .and_then(|r| r.cache.as_ref())
            .map_or(0, LookupCache::len)
    }
}

impl fmt::Debug for LookupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupStep")
            .field("table", &self.meta.qualified_table())
            .field("state", &self.state)
            .field("counters", &self.counters)
            .finish()
    }
}

fn not_ready(state: StepState) -> LookupError {
    LookupError::InvalidState(format!("Lookup step is {}, not ready", state))
}

/// Parse a return field's default literal at its declared type, then bring
/// it to the column type. An absent or empty literal means null.
fn parse_default(ret: &ReturnSpec, column_type: DataType) -> Result<Value> {
    let literal = match ret.default.as_deref() {
        Some(literal) if !literal.is_empty() => literal,
        _ => return Ok(Value::Null),
    };
    let declared = ret.default_type.unwrap_or(column_type);

    parse_literal(literal, declared)
        .and_then(|value| convert(&value, column_type))
        .map_err(|e| {
            LookupError::Configuration(format!(
                "Invalid default '{}' for return field '{}': {}",
                literal,
                ret.output_name(),
                e
            ))
        })
}
