//! Projections of the result set: a column-addressed table with
//! group-by/aggregate, flatten and column surgery.

use indexmap::IndexMap;
use serde_json::Value;

use crate::value_order;

/// Aggregations available to [`Table::group_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Numeric sum; non-numeric values are skipped.
    Sum,
    /// Numeric mean; non-numeric values are skipped.
    Mean,
    /// Minimum by the table's value ordering.
    Min,
    /// Maximum by the table's value ordering.
    Max,
    /// Number of rows in the group.
    Count,
    /// First value in group order.
    First,
    /// All values in group order.
    List,
}

/// A projected view of the result set. Rows are plain column/value maps;
/// every operation returns a new table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    rows: Vec<IndexMap<String, Value>>,
}

impl Table {
    pub(crate) fn new(rows: Vec<IndexMap<String, Value>>) -> Self {
        Self { rows }
    }

    /// The projected rows.
    pub fn rows(&self) -> &[IndexMap<String, Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep rows the predicate accepts.
    pub fn filter(&self, predicate: impl Fn(&IndexMap<String, Value>) -> bool) -> Self {
        Self::new(self.rows.iter().filter(|row| predicate(row)).cloned().collect())
    }

    /// Stable sort by the given columns, in order.
    pub fn sort_by(&self, columns: &[&str]) -> Self {
        let mut rows = self.rows.clone();

        rows.sort_by(|left, right| {
            for column in columns {
                let ordering = value_order(
                    left.get(*column).unwrap_or(&Value::Null),
                    right.get(*column).unwrap_or(&Value::Null),
                );

                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }

            std::cmp::Ordering::Equal
        });

        Self::new(rows)
    }

    /// Group by key columns and aggregate value columns.
    ///
    /// The output has one row per distinct key tuple, in first-seen order,
    /// with aggregate columns named `<column>_<aggregate>`.
    pub fn group_by(&self, keys: &[&str], aggregations: &[(&str, Aggregate)]) -> Self {
        // Value has no Hash; key groups by canonical JSON of the key tuple.
        let mut groups: IndexMap<String, (Vec<Value>, Vec<&IndexMap<String, Value>>)> = IndexMap::new();

        for row in &self.rows {
            let key: Vec<Value> = keys
                .iter()
                .map(|column| row.get(*column).cloned().unwrap_or(Value::Null))
                .collect();

            let key_id = serde_json::to_string(&key).unwrap_or_default();
            groups.entry(key_id).or_insert_with(|| (key, Vec::new())).1.push(row);
        }

        let rows = groups
            .into_values()
            .map(|(key, members)| {
                let mut out = IndexMap::new();

                for (column, value) in keys.iter().zip(key) {
                    out.insert((*column).to_string(), value);
                }

                for (column, aggregate) in aggregations {
                    let values: Vec<&Value> = members.iter().filter_map(|row| row.get(*column)).collect();
                    out.insert(format!("{column}_{}", aggregate_suffix(*aggregate)), apply(*aggregate, &values));
                }

                out
            })
            .collect();

        Self::new(rows)
    }

    /// Expand an object-valued column into one column per key
    /// (`column.key`), dropping the original.
    pub fn flatten(&self, column: &str) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = IndexMap::new();

                for (name, value) in row {
                    if name != column {
                        out.insert(name.clone(), value.clone());
                        continue;
                    }

                    match value {
                        Value::Object(map) => {
                            for (key, value) in map {
                                out.insert(format!("{column}.{key}"), value.clone());
                            }
                        }
                        other => {
                            out.insert(name.clone(), other.clone());
                        }
                    }
                }

                out
            })
            .collect();

        Self::new(rows)
    }

    /// Append a derived column.
    pub fn add_column(&self, name: &str, f: impl Fn(&IndexMap<String, Value>) -> Value) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = row.clone();
                out.insert(name.to_string(), f(row));
                out
            })
            .collect();

        Self::new(rows)
    }

    /// Remove columns by name.
    pub fn drop_columns(&self, columns: &[&str]) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(name, _)| !columns.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .collect();

        Self::new(rows)
    }

    /// Drop duplicate rows, keeping the first occurrence.
    pub fn deduplicate(&self) -> Self {
        let mut seen: Vec<&IndexMap<String, Value>> = Vec::new();
        let mut rows = Vec::new();

        for row in &self.rows {
            if !seen.contains(&row) {
                seen.push(row);
                rows.push(row.clone());
            }
        }

        Self::new(rows)
    }

    /// Distinct values of one column, in first-seen order.
    pub fn distinct(&self, column: &str) -> Vec<Value> {
        let mut values: Vec<Value> = Vec::new();

        for value in self.rows.iter().filter_map(|row| row.get(column)) {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }

        values
    }
}

fn aggregate_suffix(aggregate: Aggregate) -> &'static str {
    match aggregate {
        Aggregate::Sum => "sum",
        Aggregate::Mean => "mean",
        Aggregate::Min => "min",
        Aggregate::Max => "max",
        Aggregate::Count => "count",
        Aggregate::First => "first",
        Aggregate::List => "list",
    }
}

fn apply(aggregate: Aggregate, values: &[&Value]) -> Value {
    match aggregate {
        Aggregate::Count => Value::from(values.len()),
        Aggregate::First => values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        Aggregate::List => Value::Array(values.iter().map(|v| (*v).clone()).collect()),
        Aggregate::Sum => Value::from(numeric(values).sum::<f64>()),
        Aggregate::Mean => {
            let numbers: Vec<f64> = numeric(values).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Aggregate::Min => values
            .iter()
            .min_by(|l, r| value_order(l, r))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        Aggregate::Max => values
            .iter()
            .max_by(|l, r| value_order(l, r))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
    }
}

fn numeric<'a>(values: &'a [&'a Value]) -> impl Iterator<Item = f64> + 'a {
    values.iter().filter_map(|value| value.as_f64())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table() -> Table {
        let rows = [
            json!({ "group": "a", "score": 10, "tags": { "x": 1 } }),
            json!({ "group": "b", "score": 30, "tags": { "x": 2 } }),
            json!({ "group": "a", "score": 20, "tags": { "x": 3 } }),
        ];

        Table::new(
            rows.into_iter()
                .map(|row| {
                    let Value::Object(map) = row else { unreachable!() };
                    map.into_iter().collect()
                })
                .collect(),
        )
    }

    #[test]
    fn group_by_aggregates() {
        let grouped = table().group_by(&["group"], &[("score", Aggregate::Sum), ("score", Aggregate::Count)]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.rows()[0]["group"], json!("a"));
        assert_eq!(grouped.rows()[0]["score_sum"], json!(30.0));
        assert_eq!(grouped.rows()[0]["score_count"], json!(2));
        assert_eq!(grouped.rows()[1]["score_sum"], json!(30.0));
    }

    #[test]
    fn sort_and_flatten() {
        let sorted = table().sort_by(&["score"]);
        assert_eq!(sorted.rows()[0]["score"], json!(10));
        assert_eq!(sorted.rows()[2]["score"], json!(30));

        let flat = table().flatten("tags");
        assert_eq!(flat.rows()[0]["tags.x"], json!(1));
        assert!(!flat.rows()[0].contains_key("tags"));
    }

    #[test]
    fn column_surgery() {
        let with_double = table().add_column("double", |row| {
            Value::from(row["score"].as_f64().unwrap_or(0.0) * 2.0)
        });
        assert_eq!(with_double.rows()[1]["double"], json!(60.0));

        let dropped = with_double.drop_columns(&["tags", "double"]);
        assert_eq!(
            dropped.rows()[0].keys().collect::<Vec<_>>(),
            vec!["group", "score"]
        );
    }
}
