//! Grouping and reduction over fetched records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CairnResult, ValidationError};
use crate::query::{Query, QueryProcessor};
use crate::record::Record;

/// Field under which each group's reduced value is reported.
pub const RESULT_FIELD: &str = "result";

/// Anything that can reduce an in-memory record list to a value.
pub trait AggregationProcessor: Send + Sync {
    fn process(&self, records: Vec<Record>) -> CairnResult<Value>;
}

/// Reduction applied within each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Reducer {
    /// Number of records in the group
    Count,
    /// Sum of a numeric field
    Sum { field: String },
    /// Minimum of a numeric field
    Min { field: String },
    /// Maximum of a numeric field
    Max { field: String },
    /// Mean of a numeric field
    Average { field: String },
}

/// A grouping/reduction pipeline.
///
/// Records are optionally narrowed by `condition`, grouped by the values of
/// the `by` fields, and each group is reduced with `reduce`. The output is a
/// JSON array with one object per group, in first-seen order:
/// `{ <by fields>..., "result": <reduced> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub by: Vec<String>,
    pub reduce: Reducer,
    #[serde(default)]
    pub condition: Option<Query>,
}

impl Aggregation {
    /// Count records per group.
    pub fn count() -> Self {
        Self {
            by: Vec::new(),
            reduce: Reducer::Count,
            condition: None,
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::with_reducer(Reducer::Sum {
            field: field.into(),
        })
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::with_reducer(Reducer::Min {
            field: field.into(),
        })
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::with_reducer(Reducer::Max {
            field: field.into(),
        })
    }

    pub fn average(field: impl Into<String>) -> Self {
        Self::with_reducer(Reducer::Average {
            field: field.into(),
        })
    }

    fn with_reducer(reduce: Reducer) -> Self {
        Self {
            by: Vec::new(),
            reduce,
            condition: None,
        }
    }

    /// Add a grouping field.
    pub fn by(mut self, field: impl Into<String>) -> Self {
        self.by.push(field.into());
        self
    }

    /// Only aggregate records matching `condition`.
    pub fn condition(mut self, condition: Query) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Build an aggregation from its plain JSON form.
    pub fn from_value(value: Value) -> CairnResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            ValidationError::InvalidAggregation {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    numeric: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn add(&mut self, reducer: &Reducer, record: &Record) {
        self.count += 1;
        let field = match reducer {
            Reducer::Count => return,
            Reducer::Sum { field }
            | Reducer::Min { field }
            | Reducer::Max { field }
            | Reducer::Average { field } => field,
        };
        if let Some(n) = record.lookup(field).and_then(Value::as_f64) {
            self.numeric += 1;
            self.sum += n;
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn finish(&self, reducer: &Reducer) -> Value {
        match reducer {
            Reducer::Count => Value::from(self.count),
            Reducer::Sum { .. } => Value::from(self.sum),
            Reducer::Min { .. } => self.min.map(Value::from).unwrap_or(Value::Null),
            Reducer::Max { .. } => self.max.map(Value::from).unwrap_or(Value::Null),
            Reducer::Average { .. } if self.numeric == 0 => Value::Null,
            Reducer::Average { .. } => Value::from(self.sum / self.numeric as f64),
        }
    }
}

impl AggregationProcessor for Aggregation {
    fn process(&self, records: Vec<Record>) -> CairnResult<Value> {
        let records = match &self.condition {
            Some(condition) => condition.without_window().process(records)?,
            None => records,
        };

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Accumulator)> = Vec::new();

        for record in &records {
            let key: Vec<Value> = self
                .by
                .iter()
                .map(|field| record.lookup(field).cloned().unwrap_or(Value::Null))
                .collect();
            let fingerprint = Value::Array(key.clone()).to_string();
            let slot = *index.entry(fingerprint).or_insert_with(|| {
                groups.push((key, Accumulator::default()));
                groups.len() - 1
            });
            groups[slot].1.add(&self.reduce, record);
        }

        let rows = groups
            .into_iter()
            .map(|(key, acc)| {
                let mut row = Map::new();
                for (field, value) in self.by.iter().zip(key) {
                    row.insert(field.clone(), value);
                }
                row.insert(RESULT_FIELD.to_string(), acc.finish(&self.reduce));
                Value::Object(row)
            })
            .collect();

        Ok(Value::Array(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> Vec<Record> {
        [
            json!({"_id": "1", "region": "north", "amount": 10}),
            json!({"_id": "2", "region": "south", "amount": 5}),
            json!({"_id": "3", "region": "north", "amount": 7.5}),
            json!({"_id": "4", "region": "south"}),
        ]
        .into_iter()
        .map(|v| Record::from_value(v).unwrap())
        .collect()
    }

    #[test]
    fn test_count_without_grouping() {
        let out = Aggregation::count().process(sales()).unwrap();
        assert_eq!(out, json!([{"result": 4}]));
    }

    #[test]
    fn test_count_by_region_in_first_seen_order() {
        let out = Aggregation::count().by("region").process(sales()).unwrap();
        assert_eq!(
            out,
            json!([
                {"region": "north", "result": 2},
                {"region": "south", "result": 2}
            ])
        );
    }

    #[test]
    fn test_sum_and_average_ignore_non_numeric() {
        let sum = Aggregation::sum("amount").by("region").process(sales()).unwrap();
        assert_eq!(sum[0]["result"].as_f64(), Some(17.5));
        assert_eq!(sum[1]["result"].as_f64(), Some(5.0));

        let avg = Aggregation::average("amount").by("region").process(sales()).unwrap();
        assert_eq!(avg[0]["result"].as_f64(), Some(8.75));
        assert_eq!(avg[1]["result"].as_f64(), Some(5.0));
    }

    #[test]
    fn test_min_max() {
        let min = Aggregation::min("amount").process(sales()).unwrap();
        assert_eq!(min[0]["result"].as_f64(), Some(5.0));
        let max = Aggregation::max("amount").process(sales()).unwrap();
        assert_eq!(max[0]["result"].as_f64(), Some(10.0));
    }

    #[test]
    fn test_average_of_no_numbers_is_null() {
        let out = Aggregation::average("missing").process(sales()).unwrap();
        assert_eq!(out[0]["result"], Value::Null);
    }

    #[test]
    fn test_condition_narrows_input() {
        let out = Aggregation::count()
            .condition(Query::new().equal_to("region", "south").limit(1))
            .process(sales())
            .unwrap();
        assert_eq!(out, json!([{"result": 2}]));
    }

    #[test]
    fn test_from_plain_json() {
        let agg = Aggregation::from_value(json!({
            "by": ["region"],
            "reduce": {"op": "sum", "field": "amount"}
        }))
        .unwrap();
        assert_eq!(agg, Aggregation::sum("amount").by("region"));

        assert!(Aggregation::from_value(json!({"reduce": {"op": "median"}})).is_err());
    }
}
