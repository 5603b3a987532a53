//! Query expressions evaluated against fetched records.
//!
//! A [`Query`] is a list of [`FilterExpr`] (all must match), an ordered
//! list of sort keys, and an optional `skip`/`limit` window. Queries are
//! pure: [`QueryProcessor::process`] takes the full record list and returns
//! the selected records without touching storage.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CairnResult, ValidationError};
use crate::record::Record;

/// Anything that can select records from an in-memory list.
pub trait QueryProcessor: Send + Sync {
    /// Filter, sort, and window `records`.
    fn process(&self, records: Vec<Record>) -> CairnResult<Vec<Record>>;
}

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to (an array field matches if it contains the value)
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (strings) or element (arrays)
    Contains,
    /// In list of values
    In,
    /// Matches regular expression
    Regex,
    /// Field presence matches the boolean value
    Exists,
    /// Logical AND over an array of nested expressions
    And,
    /// Logical OR over an array of nested expressions
    Or,
    /// Logical NOT of one nested expression
    Not,
}

/// Filter expression for queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on (dotted paths allowed; ignored by logical operators)
    #[serde(default)]
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against; nested expressions for logical operators
    #[serde(default)]
    pub value: Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    /// Match when any of `exprs` matches.
    pub fn or(exprs: Vec<FilterExpr>) -> CairnResult<Self> {
        Ok(Self::new("", FilterOperator::Or, to_json(&exprs)?))
    }

    /// Match when all of `exprs` match.
    pub fn and(exprs: Vec<FilterExpr>) -> CairnResult<Self> {
        Ok(Self::new("", FilterOperator::And, to_json(&exprs)?))
    }

    /// Match when `expr` does not.
    pub fn not(expr: FilterExpr) -> CairnResult<Self> {
        Ok(Self::new("", FilterOperator::Not, to_json(&expr)?))
    }

    /// Evaluate against one record.
    pub fn matches(&self, record: &Record) -> CairnResult<bool> {
        let field = record.lookup(&self.field);
        let matched = match self.operator {
            FilterOperator::Eq => equals(field, &self.value),
            FilterOperator::Ne => !equals(field, &self.value),
            FilterOperator::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            FilterOperator::Lt => compare(field, &self.value) == Some(Ordering::Less),
            FilterOperator::Gte => matches!(
                compare(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::Lte => matches!(
                compare(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Contains => match (field, &self.value) {
                (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
                (Some(Value::Array(items)), needle) => items.contains(needle),
                _ => false,
            },
            FilterOperator::In => match &self.value {
                Value::Array(options) => options.iter().any(|option| equals(field, option)),
                other => {
                    return Err(invalid(format!("'in' expects an array, got {}", other)));
                }
            },
            FilterOperator::Regex => {
                let pattern = self
                    .value
                    .as_str()
                    .ok_or_else(|| invalid("'regex' expects a string pattern"))?;
                let re = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
                field.and_then(Value::as_str).is_some_and(|s| re.is_match(s))
            }
            FilterOperator::Exists => {
                let wanted = self.value.as_bool().unwrap_or(true);
                field.is_some() == wanted
            }
            FilterOperator::And => {
                for expr in nested_list(&self.value)? {
                    if !expr.matches(record)? {
                        return Ok(false);
                    }
                }
                true
            }
            FilterOperator::Or => {
                for expr in nested_list(&self.value)? {
                    if expr.matches(record)? {
                        return Ok(true);
                    }
                }
                false
            }
            FilterOperator::Not => {
                let expr: FilterExpr = serde_json::from_value(self.value.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                !expr.matches(record)?
            }
        };
        Ok(matched)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// A filter plus optional sort and window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub filter: Vec<FilterExpr>,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl Query {
    /// An empty query that selects every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from its plain JSON form.
    pub fn from_value(value: Value) -> CairnResult<Self> {
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }

    /// Add a filter expression.
    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.filter.push(expr);
        self
    }

    /// Shorthand for an equality filter.
    pub fn equal_to(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(FilterExpr::eq(field, value.into()))
    }

    /// Add an ascending sort key.
    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order: SortOrder::Asc,
        });
        self
    }

    /// Add a descending sort key.
    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order: SortOrder::Desc,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// The same filter with sort, skip, and limit removed.
    pub fn without_window(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            ..Self::default()
        }
    }

    /// Whether this query selects a window rather than the full match set.
    pub fn is_windowed(&self) -> bool {
        !self.sort.is_empty() || self.limit.is_some() || self.skip > 0
    }

    /// Evaluate the filter part against one record.
    pub fn matches(&self, record: &Record) -> CairnResult<bool> {
        for expr in &self.filter {
            if !expr.matches(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl QueryProcessor for Query {
    fn process(&self, records: Vec<Record>) -> CairnResult<Vec<Record>> {
        let mut selected = Vec::with_capacity(records.len());
        for record in records {
            if self.matches(&record)? {
                selected.push(record);
            }
        }

        if !self.sort.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.sort {
                    let ordering = sort_order(a.lookup(&key.field), b.lookup(&key.field));
                    let ordering = match key.order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let windowed = selected.into_iter().skip(self.skip);
        Ok(match self.limit {
            Some(limit) => windowed.take(limit).collect(),
            None => windowed.collect(),
        })
    }
}

impl TryFrom<Value> for Query {
    type Error = crate::error::CairnError;

    fn try_from(value: Value) -> CairnResult<Self> {
        Self::from_value(value)
    }
}

// ============================================================================
// VALUE COMPARISON
// ============================================================================

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(Value::Number(a)) => match (a.as_f64(), expected.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        Some(value) => value == expected,
    }
}

/// Ordering for range operators; `None` when the types are not comparable.
fn compare(field: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (field?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used for sorting mixed values: missing/null, booleans,
/// numbers, strings, arrays, objects.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn nested_list(value: &Value) -> CairnResult<Vec<FilterExpr>> {
    serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> CairnResult<Value> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

fn invalid(reason: impl Into<String>) -> crate::error::CairnError {
    ValidationError::InvalidQuery {
        reason: reason.into(),
    }
    .into()
}
