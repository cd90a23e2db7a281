//! The ordered result set: one typed row per interview, with a
//! projection/filter/aggregate surface.
//!
//! Rows arrive out of completion order and are inserted at their ordinal
//! slot, so iteration always follows the canonical population enumeration.
//! Existing rows are immutable; every operation returns a new value.

mod row;
mod table;

use indexmap::IndexMap;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
pub use row::{ExceptionRecord, ResultRow, TurnRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use table::{Aggregate, Table};

/// Ordered collection of result rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    rows: Vec<ResultRow>,
}

impl Results {
    /// Empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row at its ordinal slot. Rows may arrive in any order;
    /// iteration order is always ascending `order`.
    pub fn insert_ordered(&mut self, row: ResultRow) {
        let position = self.rows.partition_point(|existing| existing.order < row.order);
        self.rows.insert(position, row);
    }

    /// Rows in canonical order.
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Iterate rows in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows accepted by the predicate, as a new set.
    pub fn filter(&self, predicate: impl Fn(&ResultRow) -> bool) -> Self {
        Self {
            rows: self.rows.iter().filter(|row| predicate(row)).cloned().collect(),
        }
    }

    /// Stable sort by dotted column addresses.
    pub fn sort_by(&self, columns: &[&str]) -> Self {
        let mut rows = self.rows.clone();

        rows.sort_by(|left, right| {
            for column in columns {
                let ordering = value_order(
                    &left.column(column).unwrap_or(Value::Null),
                    &right.column(column).unwrap_or(Value::Null),
                );

                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }

            std::cmp::Ordering::Equal
        });

        Self { rows }
    }

    /// Reproducible shuffle: identical seed and input yield an identical
    /// sequence.
    pub fn shuffle(&self, seed: u64) -> Self {
        let mut rows = self.rows.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);

        Self { rows }
    }

    /// Reproducible sample of up to `n` rows.
    pub fn sample(&self, n: usize, seed: u64) -> Self {
        let mut shuffled = self.shuffle(seed);
        shuffled.rows.truncate(n);
        shuffled
    }

    /// Drop rows equal to an earlier row, keeping the first.
    pub fn deduplicate(&self) -> Self {
        let mut rows: Vec<ResultRow> = Vec::new();

        for row in &self.rows {
            if !rows.contains(row) {
                rows.push(row.clone());
            }
        }

        Self { rows }
    }

    /// Project columns into a [`Table`]. Patterns are exact addresses or
    /// wildcard prefixes (`answer.*`); `*` selects every populated column.
    pub fn select(&self, patterns: &[&str]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut projected = IndexMap::new();

                for name in row.column_names() {
                    if patterns.iter().any(|pattern| matches_pattern(pattern, &name)) {
                        projected.insert(name.clone(), row.column(&name).unwrap_or(Value::Null));
                    }
                }

                projected
            })
            .collect();

        Table::new(rows)
    }

    /// The full table: every populated column.
    pub fn table(&self) -> Table {
        self.select(&["*"])
    }

    /// Serialize for checkpoint-style persistence.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Load a previously serialized result set.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FromIterator<ResultRow> for Results {
    fn from_iter<T: IntoIterator<Item = ResultRow>>(iter: T) -> Self {
        let mut results = Results::new();

        for row in iter {
            results.insert_ordered(row);
        }

        results
    }
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

/// Total order over JSON values: null < bool < number < string < array
/// < object; numbers compare as f64, strings lexicographically.
pub(crate) fn value_order(left: &Value, right: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        _ => rank(left).cmp(&rank(right)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(order: usize, answer: &str) -> ResultRow {
        let mut turns = IndexMap::new();
        turns.insert(
            "q1".to_string(),
            TurnRecord {
                answer: json!(answer),
                comment: None,
                generated_tokens: Some(answer.to_string()),
                question_text: "t".to_string(),
                question_type: "free_text".to_string(),
                question_options: Vec::new(),
                user_prompt: "u".to_string(),
                system_prompt: "s".to_string(),
                raw_model_response: json!({}),
                cache_key: String::new(),
                cache_used: false,
                validated: true,
                input_tokens: 1,
                output_tokens: 1,
                cost: 0.0,
            },
        );

        ResultRow {
            order,
            iteration: 0,
            agent: json!({ "name": format!("agent{order}"), "traits": {} }),
            scenario: json!({}),
            model: json!({ "model_name": "canned", "inference_service": "test", "parameters": {} }),
            turns,
            exceptions: Vec::new(),
        }
    }

    #[test]
    fn out_of_order_insertion_yields_canonical_order() {
        let mut results = Results::new();

        for order in [3, 0, 2, 1] {
            results.insert_ordered(row(order, "x"));
        }

        let orders: Vec<usize> = results.iter().map(|row| row.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let results: Results = (0..20).map(|order| row(order, "x")).collect();

        let a = results.shuffle(42);
        let b = results.shuffle(42);
        let c = results.shuffle(43);

        assert_eq!(a, b);
        assert_ne!(a, c);
        // A shuffle permutes; it never loses rows.
        assert_eq!(a.len(), results.len());
    }

    #[test]
    fn seeded_sample_is_a_reproducible_subset() {
        let results: Results = (0..20).map(|order| row(order, "x")).collect();

        let a = results.sample(5, 7);
        let b = results.sample(5, 7);

        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|sampled| results.rows().contains(sampled)));
    }

    #[test]
    fn select_with_wildcards() {
        let results: Results = (0..2).map(|order| row(order, "hello")).collect();

        let table = results.select(&["answer.*", "order"]);

        assert_eq!(table.rows()[0]["answer.q1"], json!("hello"));
        assert_eq!(table.rows()[1]["order"], json!(1));
        assert_eq!(table.rows()[0].len(), 2);
    }

    #[test]
    fn round_trip() {
        let results: Results = (0..3).map(|order| row(order, "x")).collect();
        let json = results.to_json().unwrap();
        let back = Results::from_json(&json).unwrap();

        assert_eq!(results, back);
    }

    #[test]
    fn deduplicate_keeps_first() {
        let mut results = Results::new();
        results.insert_ordered(row(0, "x"));
        results.insert_ordered(row(0, "x"));
        results.insert_ordered(row(1, "y"));

        assert_eq!(results.deduplicate().len(), 2);
    }
}
