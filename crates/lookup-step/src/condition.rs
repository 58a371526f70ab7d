//! Key conditions and cache-side predicate evaluation
//!
//! Each configured key pairs a table column with a [`KeyCondition`]. The
//! condition names the stream field(s) it reads: none for the null checks,
//! two for `BETWEEN`, one for everything else. Once field names have been
//! resolved to offsets the same enum is reused with `usize` payloads.

use lookup_cache::{LookupCache, RowKey};
use lookup_core::convert::{compare, is_null};
use lookup_core::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison applied between a table column and the key value(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum KeyCondition<F = String> {
    #[serde(rename = "=")]
    Eq { field: F },
    #[serde(rename = "<>")]
    NotEq { field: F },
    #[serde(rename = "<")]
    Lt { field: F },
    #[serde(rename = "<=")]
    LtEq { field: F },
    #[serde(rename = ">")]
    Gt { field: F },
    #[serde(rename = ">=")]
    GtEq { field: F },
    #[serde(rename = "LIKE")]
    Like { field: F },
    #[serde(rename = "BETWEEN")]
    Between { low: F, high: F },
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl KeyCondition<String> {
    pub fn eq(field: impl Into<String>) -> Self {
        KeyCondition::Eq { field: field.into() }
    }

    pub fn not_eq(field: impl Into<String>) -> Self {
        KeyCondition::NotEq { field: field.into() }
    }

    pub fn lt(field: impl Into<String>) -> Self {
        KeyCondition::Lt { field: field.into() }
    }

    pub fn lt_eq(field: impl Into<String>) -> Self {
        KeyCondition::LtEq { field: field.into() }
    }

    pub fn gt(field: impl Into<String>) -> Self {
        KeyCondition::Gt { field: field.into() }
    }

    pub fn gt_eq(field: impl Into<String>) -> Self {
        KeyCondition::GtEq { field: field.into() }
    }

    pub fn like(field: impl Into<String>) -> Self {
        KeyCondition::Like { field: field.into() }
    }

    pub fn between(low: impl Into<String>, high: impl Into<String>) -> Self {
        KeyCondition::Between {
            low: low.into(),
            high: high.into(),
        }
    }
}

impl<F> KeyCondition<F> {
    pub fn operator(&self) -> Operator {
        match self {
            KeyCondition::Eq { .. } => Operator::Eq,
            KeyCondition::NotEq { .. } => Operator::NotEq,
            KeyCondition::Lt { .. } => Operator::Lt,
            KeyCondition::LtEq { .. } => Operator::LtEq,
            KeyCondition::Gt { .. } => Operator::Gt,
            KeyCondition::GtEq { .. } => Operator::GtEq,
            KeyCondition::Like { .. } => Operator::Like,
            KeyCondition::Between { .. } => Operator::Between,
            KeyCondition::IsNull => Operator::IsNull,
            KeyCondition::IsNotNull => Operator::IsNotNull,
        }
    }

    /// Stream fields consumed, in key-slot order.
    pub fn fields(&self) -> Vec<&F> {
        match self {
            KeyCondition::Eq { field }
            | KeyCondition::NotEq { field }
            | KeyCondition::Lt { field }
            | KeyCondition::LtEq { field }
            | KeyCondition::Gt { field }
            | KeyCondition::GtEq { field }
            | KeyCondition::Like { field } => vec![field],
            KeyCondition::Between { low, high } => vec![low, high],
            KeyCondition::IsNull | KeyCondition::IsNotNull => Vec::new(),
        }
    }

    /// Rewrite the field payloads, e.g. names into input offsets.
    pub fn try_map<G, E>(
        &self,
        mut f: impl FnMut(&F) -> Result<G, E>,
    ) -> Result<KeyCondition<G>, E> {
        Ok(match self {
            KeyCondition::Eq { field } => KeyCondition::Eq { field: f(field)? },
            KeyCondition::NotEq { field } => KeyCondition::NotEq { field: f(field)? },
            KeyCondition::Lt { field } => KeyCondition::Lt { field: f(field)? },
            KeyCondition::LtEq { field } => KeyCondition::LtEq { field: f(field)? },
            KeyCondition::Gt { field } => KeyCondition::Gt { field: f(field)? },
            KeyCondition::GtEq { field } => KeyCondition::GtEq { field: f(field)? },
            KeyCondition::Like { field } => KeyCondition::Like { field: f(field)? },
            KeyCondition::Between { low, high } => KeyCondition::Between {
                low: f(low)?,
                high: f(high)?,
            },
            KeyCondition::IsNull => KeyCondition::IsNull,
            KeyCondition::IsNotNull => KeyCondition::IsNotNull,
        })
    }
}

/// Operator of a key condition, without its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Number of key slots (stream values) the operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            Operator::IsNull | Operator::IsNotNull => 0,
            Operator::Between => 2,
            _ => 1,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Like => "LIKE",
            Operator::Between => "BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Evaluate `stored OP operands` against a cached table value.
    ///
    /// Returns `None` for `LIKE`, which is never answered from the cache.
    /// `operands` must hold exactly [`arity`](Self::arity) values.
    pub fn matches(&self, stored: &Value, operands: &[Value]) -> Option<bool> {
        let cmp = |i: usize| operands.get(i).map(|k| compare(stored, k));

        let matched = match self {
            Operator::Eq => cmp(0)? == Ordering::Equal,
            Operator::NotEq => cmp(0)? != Ordering::Equal,
            Operator::Lt => cmp(0)? == Ordering::Less,
            Operator::LtEq => cmp(0)? != Ordering::Greater,
            Operator::Gt => cmp(0)? == Ordering::Greater,
            Operator::GtEq => cmp(0)? != Ordering::Less,
            Operator::Between => cmp(0)? != Ordering::Less && cmp(1)? != Ordering::Greater,
            Operator::IsNull => is_null(stored),
            Operator::IsNotNull => !is_null(stored),
            Operator::Like => return None,
        };
        Some(matched)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql())
    }
}

/// How a step answers lookups, fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Every condition is `=`: exact hash probe, database results are cached.
    AllEquals,
    /// Mixed operators: linear cache scan, only bulk loading fills the cache.
    Conditional,
    /// At least one `LIKE`: the cache is bypassed for every row.
    DatabaseOnly,
}

impl LookupStrategy {
    pub fn classify<I>(operators: I) -> Self
    where
        I: IntoIterator<Item = Operator>,
    {
        let mut all_equals = true;
        for op in operators {
            match op {
                Operator::Like => return LookupStrategy::DatabaseOnly,
                Operator::Eq => {}
                _ => all_equals = false,
            }
        }
        if all_equals {
            LookupStrategy::AllEquals
        } else {
            LookupStrategy::Conditional
        }
    }

    pub fn uses_cache(&self) -> bool {
        !matches!(self, LookupStrategy::DatabaseOnly)
    }
}

impl fmt::Display for LookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookupStrategy::AllEquals => "all-equals",
            LookupStrategy::Conditional => "conditional",
            LookupStrategy::DatabaseOnly => "database-only",
        };
        write!(f, "{}", name)
    }
}

/// Matches lookup keys against cached entries.
///
/// A lookup key has one slot per consumed stream value (see
/// [`Operator::arity`]); a cached key has one slot per condition, holding
/// the table column value.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    operators: Vec<Operator>,
    strategy: LookupStrategy,
}

impl ConditionEvaluator {
    pub fn new(operators: Vec<Operator>) -> Self {
        let strategy = LookupStrategy::classify(operators.iter().copied());
        Self {
            operators,
            strategy,
        }
    }

    pub fn strategy(&self) -> LookupStrategy {
        self.strategy
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Number of slots in a lookup key.
    pub fn key_width(&self) -> usize {
        self.operators.iter().map(Operator::arity).sum()
    }

    /// Whether a cached key satisfies every condition for `lookup`.
    /// `None` when a condition cannot be evaluated from the cache.
    pub fn matches(&self, stored: &RowKey, lookup: &RowKey) -> Option<bool> {
        let mut cursor = 0;
        for (i, op) in self.operators.iter().enumerate() {
            let stored_value = stored.get(i)?;
            let operands = lookup.values().get(cursor..cursor + op.arity())?;
            cursor += op.arity();
            if !op.matches(stored_value, operands)? {
                return Some(false);
            }
        }
        Some(true)
    }

    /// Probe the cache for `lookup` using the strategy's access path.
    pub fn find<'a>(&self, cache: &'a LookupCache, lookup: &RowKey) -> Option<&'a [Value]> {
        match self.strategy {
            LookupStrategy::AllEquals => cache.get(lookup),
            LookupStrategy::Conditional => cache
                .scan(|stored| self.matches(stored, lookup) == Some(true))
                .map(|(_, values)| values),
            LookupStrategy::DatabaseOnly => None,
        }
    }
}
