//! Per-type structural validation and constraint enforcement.
//!
//! `permissive` relaxes closed-set membership and cardinality/range
//! constraints but never structural shape: a permissive checkbox still
//! requires a list of strings, it just stops counting them.

use serde_json::{Map, Value, json};
use survey::{Question, QuestionType};

use crate::{
    FailureKind, Outcome,
    normalize::{number_value, resolve_option, round2, scalar_string},
};

pub(crate) fn validate(question: &Question, answer: &Value) -> Outcome {
    match question.question_type {
        QuestionType::FreeText | QuestionType::Markdown => text(answer),
        QuestionType::MultipleChoice
        | QuestionType::YesNo
        | QuestionType::LikertFive
        | QuestionType::Dropdown => one_option(question, answer, question.permissive),
        QuestionType::MultipleChoiceWithOther => one_option(question, answer, true),
        QuestionType::Checkbox | QuestionType::TopK => option_subset(question, answer),
        QuestionType::Numerical => numerical(question, answer),
        QuestionType::LinearScale => linear_scale(question, answer),
        QuestionType::List => text_list(question, answer),
        QuestionType::Dict => keyed_map(question, answer, false),
        QuestionType::Extract => keyed_map(question, answer, true),
        QuestionType::Matrix => matrix(question, answer),
        QuestionType::Rank => rank(question, answer),
        QuestionType::Budget => budget(question, answer),
        QuestionType::Compute => compute(answer),
        QuestionType::PydanticSchema => schema_bound(question, answer),
    }
}

fn text(answer: &Value) -> Outcome {
    match scalar_string(answer) {
        Some(s) => Outcome::Valid(Value::String(s)),
        None => Outcome::invalid(FailureKind::Shape, "expected a string answer", answer),
    }
}

fn one_option(question: &Question, answer: &Value, allow_other: bool) -> Outcome {
    let Some(reply) = scalar_string(answer) else {
        return Outcome::invalid(FailureKind::Shape, "expected a single string answer", answer);
    };

    match resolve_option(&reply, &question.question_options) {
        Some(option) => Outcome::Valid(Value::String(option)),
        None if allow_other => Outcome::Valid(Value::String(reply)),
        None => Outcome::invalid(
            FailureKind::ClosedSet,
            format!("'{reply}' is not one of the options"),
            answer,
        ),
    }
}

fn option_subset(question: &Question, answer: &Value) -> Outcome {
    let Value::Array(items) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected a list of options", answer);
    };

    let mut selected: Vec<String> = Vec::with_capacity(items.len());

    for item in items {
        let Some(reply) = scalar_string(item) else {
            return Outcome::invalid(FailureKind::Shape, "expected each selection to be a string", answer);
        };

        let resolved = match resolve_option(&reply, &question.question_options) {
            Some(option) => option,
            None if question.permissive => reply,
            None => {
                return Outcome::invalid(
                    FailureKind::ClosedSet,
                    format!("'{reply}' is not one of the options"),
                    answer,
                );
            }
        };

        if !selected.contains(&resolved) {
            selected.push(resolved);
        }
    }

    if !question.permissive {
        if let Some(min) = question.min_selections
            && selected.len() < min
        {
            return Outcome::invalid(
                FailureKind::Cardinality,
                format!("expected at least {min} selections, got {}", selected.len()),
                answer,
            );
        }

        if let Some(max) = question.max_selections
            && selected.len() > max
        {
            return Outcome::invalid(
                FailureKind::Cardinality,
                format!("expected at most {max} selections, got {}", selected.len()),
                answer,
            );
        }
    }

    Outcome::Valid(json!(selected))
}

fn numerical(question: &Question, answer: &Value) -> Outcome {
    let Some(n) = answer.as_f64() else {
        return Outcome::invalid(FailureKind::Shape, "expected a numeric answer", answer);
    };

    if !question.permissive {
        if let Some(min) = question.min_value
            && n < min
        {
            return Outcome::invalid(FailureKind::Range, format!("{n} is below the minimum {min}"), answer);
        }

        if let Some(max) = question.max_value
            && n > max
        {
            return Outcome::invalid(FailureKind::Range, format!("{n} is above the maximum {max}"), answer);
        }
    }

    Outcome::Valid(number_value(n))
}

fn linear_scale(question: &Question, answer: &Value) -> Outcome {
    let value = match answer {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => f as i64,
                _ => {
                    return Outcome::invalid(FailureKind::Shape, "expected a whole number on the scale", answer);
                }
            },
        },
        _ => return Outcome::invalid(FailureKind::Shape, "expected a whole number on the scale", answer),
    };

    if let Some((lo, hi)) = question.scale_range
        && !question.permissive
        && (value < lo || value > hi)
    {
        return Outcome::invalid(
            FailureKind::Range,
            format!("{value} is outside the scale {lo}..={hi}"),
            answer,
        );
    }

    Outcome::Valid(Value::from(value))
}

fn text_list(question: &Question, answer: &Value) -> Outcome {
    let Value::Array(items) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected a list answer", answer);
    };

    let mut normalized = Vec::with_capacity(items.len());

    for item in items {
        let Some(s) = scalar_string(item) else {
            return Outcome::invalid(FailureKind::Shape, "expected each list item to be a string", answer);
        };
        normalized.push(Value::String(s));
    }

    if !question.permissive {
        if let Some(min) = question.min_list_items
            && normalized.len() < min
        {
            return Outcome::invalid(
                FailureKind::Cardinality,
                format!("expected at least {min} items, got {}", normalized.len()),
                answer,
            );
        }

        if let Some(max) = question.max_list_items
            && normalized.len() > max
        {
            return Outcome::invalid(
                FailureKind::Cardinality,
                format!("expected at most {max} items, got {}", normalized.len()),
                answer,
            );
        }
    }

    Outcome::Valid(Value::Array(normalized))
}

fn keyed_map(question: &Question, answer: &Value, nulls_for_missing: bool) -> Outcome {
    let Value::Object(map) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected an object answer", answer);
    };

    let mut normalized = Map::new();

    for (key, kind) in &question.answer_keys {
        match map.get(key) {
            Some(value) if kind.matches(value) => {
                normalized.insert(key.clone(), value.clone());
            }
            Some(Value::Null) | None if nulls_for_missing || question.permissive => {
                normalized.insert(key.clone(), Value::Null);
            }
            Some(value) => {
                return Outcome::invalid(
                    FailureKind::Shape,
                    format!("value for '{key}' does not match the declared kind {kind:?}"),
                    answer,
                );
            }
            None => {
                return Outcome::invalid(FailureKind::MissingKey, format!("missing key '{key}'"), answer);
            }
        }
    }

    // Undeclared keys are dropped; the declaration is the contract.
    Outcome::Valid(Value::Object(normalized))
}

fn matrix(question: &Question, answer: &Value) -> Outcome {
    let Value::Object(map) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected an object mapping rows to options", answer);
    };

    let mut normalized = Map::new();

    for row in &question.matrix_rows {
        let Some(value) = map.get(row) else {
            if question.permissive {
                continue;
            }
            return Outcome::invalid(FailureKind::MissingKey, format!("missing row '{row}'"), answer);
        };

        let Some(reply) = scalar_string(value) else {
            return Outcome::invalid(FailureKind::Shape, format!("row '{row}' must choose a single option"), answer);
        };

        match resolve_option(&reply, &question.question_options) {
            Some(option) => {
                normalized.insert(row.clone(), Value::String(option));
            }
            None if question.permissive => {
                normalized.insert(row.clone(), Value::String(reply));
            }
            None => {
                return Outcome::invalid(
                    FailureKind::ClosedSet,
                    format!("'{reply}' is not a column option for row '{row}'"),
                    answer,
                );
            }
        }
    }

    Outcome::Valid(Value::Object(normalized))
}

fn rank(question: &Question, answer: &Value) -> Outcome {
    let Value::Array(items) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected an ordered list of options", answer);
    };

    let mut ranked: Vec<String> = Vec::with_capacity(items.len());

    for item in items {
        let Some(reply) = scalar_string(item) else {
            return Outcome::invalid(FailureKind::Shape, "expected each rank entry to be a string", answer);
        };

        let resolved = match resolve_option(&reply, &question.question_options) {
            Some(option) => option,
            None if question.permissive => reply,
            None => {
                return Outcome::invalid(
                    FailureKind::ClosedSet,
                    format!("'{reply}' is not one of the options"),
                    answer,
                );
            }
        };

        if ranked.contains(&resolved) {
            return Outcome::invalid(
                FailureKind::Shape,
                format!("'{resolved}' appears more than once in the ranking"),
                answer,
            );
        }

        ranked.push(resolved);
    }

    if !question.permissive {
        let expected = match (question.min_selections, question.max_selections) {
            // A k-prefix ranking when bounds are declared.
            (Some(min), Some(max)) => min..=max,
            (Some(min), None) => min..=question.question_options.len(),
            (None, Some(max)) => max..=max,
            // Default: a full permutation.
            (None, None) => question.question_options.len()..=question.question_options.len(),
        };

        if !expected.contains(&ranked.len()) {
            return Outcome::invalid(
                FailureKind::Cardinality,
                format!("expected {expected:?} ranked options, got {}", ranked.len()),
                answer,
            );
        }
    }

    Outcome::Valid(json!(ranked))
}

fn budget(question: &Question, answer: &Value) -> Outcome {
    let Value::Object(map) = answer else {
        return Outcome::invalid(FailureKind::Shape, "expected an object mapping options to amounts", answer);
    };

    let mut normalized = Map::new();
    let mut sum = 0.0;

    for option in &question.question_options {
        let amount = match map.get(option) {
            Some(value) => match value.as_f64() {
                Some(amount) => amount,
                None => {
                    return Outcome::invalid(
                        FailureKind::Shape,
                        format!("allocation for '{option}' must be a number"),
                        answer,
                    );
                }
            },
            // Unallocated options are an explicit zero.
            None => 0.0,
        };

        if amount < 0.0 {
            return Outcome::invalid(
                FailureKind::Range,
                format!("allocation for '{option}' is negative"),
                answer,
            );
        }

        let amount = round2(amount);
        sum += amount;
        normalized.insert(option.clone(), number_value(amount));
    }

    if let Some(total) = question.budget_sum
        && !question.permissive
    {
        let tolerance = (total.abs() * 0.01).max(0.01);

        if (sum - total).abs() > tolerance {
            return Outcome::invalid(
                FailureKind::Sum,
                format!("allocation sums to {sum}, expected {total}"),
                answer,
            );
        }
    }

    Outcome::Valid(Value::Object(normalized))
}

fn compute(answer: &Value) -> Outcome {
    Outcome::Valid(answer.clone())
}

fn schema_bound(question: &Question, answer: &Value) -> Outcome {
    let Some(schema) = &question.answer_schema else {
        // No schema declared means no constraint beyond being present.
        return Outcome::Valid(answer.clone());
    };

    match check_schema(answer, schema) {
        Ok(()) => Outcome::Valid(answer.clone()),
        Err(message) => Outcome::invalid(FailureKind::Schema, message, answer),
    }
}

/// Structural subset of JSON Schema: `type`, `enum`, `properties` +
/// `required`, `items`, `minimum`/`maximum`, `minItems`/`maxItems`.
fn check_schema(value: &Value, schema: &Value) -> Result<(), String> {
    let Value::Object(schema) = schema else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(t) => type_matches(value, t),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(value, t)),
            _ => true,
        };

        if !matches {
            return Err(format!("expected type {expected}, got {value}"));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum")
        && !allowed.contains(value)
    {
        return Err(format!("{value} is not in the enum"));
    }

    if let Some(n) = value.as_f64() {
        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64)
            && n < minimum
        {
            return Err(format!("{n} is below the minimum {minimum}"));
        }

        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64)
            && n > maximum
        {
            return Err(format!("{n} is above the maximum {maximum}"));
        }
    }

    if let (Value::Object(map), Some(Value::Object(properties))) = (value, schema.get("properties")) {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for name in &required {
            if !map.contains_key(*name) {
                return Err(format!("missing required property '{name}'"));
            }
        }

        for (name, property_schema) in properties {
            if let Some(property) = map.get(name) {
                check_schema(property, property_schema).map_err(|e| format!("at '{name}': {e}"))?;
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
            && (items.len() as u64) < min
        {
            return Err(format!("expected at least {min} items"));
        }

        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
            && (items.len() as u64) > max
        {
            return Err(format!("expected at most {max} items"));
        }

        for (index, item) in items.iter().enumerate() {
            check_schema(item, item_schema).map_err(|e| format!("at [{index}]: {e}"))?;
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use survey::{Question, ValueKind};

    use crate::{FailureKind, Outcome, validate};

    #[test]
    fn multiple_choice_case_insensitive() {
        let question = Question::multiple_choice("q", "t", ["Yes", "No"]);

        assert_eq!(validate(&question, &json!("YES")), Outcome::Valid(json!("Yes")));
        assert!(matches!(
            validate(&question, &json!("maybe")),
            Outcome::Invalid {
                kind: FailureKind::ClosedSet,
                ..
            }
        ));
    }

    #[test]
    fn multiple_choice_with_other_accepts_off_list() {
        let question = Question::multiple_choice_with_other("q", "t", ["a", "b"]);

        assert_eq!(validate(&question, &json!("something else")), Outcome::Valid(json!("something else")));
    }

    #[test]
    fn checkbox_constraint_enforced_unless_permissive() {
        let question = Question::checkbox("q", "t", ["a", "b", "c", "d"]).with_selection_bounds(2, 3);

        assert!(matches!(
            validate(&question, &json!(["a"])),
            Outcome::Invalid {
                kind: FailureKind::Cardinality,
                ..
            }
        ));

        let permissive = question.clone().permissive();
        assert_eq!(validate(&permissive, &json!(["a"])), Outcome::Valid(json!(["a"])));
    }

    #[test]
    fn checkbox_dedups_preserving_order() {
        let question = Question::checkbox("q", "t", ["a", "b", "c"]).with_selection_bounds(1, 3);

        assert_eq!(
            validate(&question, &json!(["b", "B", "a"])),
            Outcome::Valid(json!(["b", "a"]))
        );
    }

    #[test]
    fn numerical_range() {
        let question = Question::numerical("q", "t").with_value_range(0.0, 100.0);

        assert_eq!(validate(&question, &json!(40.0)), Outcome::Valid(json!(40)));
        assert!(matches!(
            validate(&question, &json!(101)),
            Outcome::Invalid {
                kind: FailureKind::Range,
                ..
            }
        ));
    }

    #[test]
    fn linear_scale_bounds() {
        let question = Question::linear_scale("q", "t", 1, 5);

        assert_eq!(validate(&question, &json!(3)), Outcome::Valid(json!(3)));
        assert!(matches!(
            validate(&question, &json!(6)),
            Outcome::Invalid {
                kind: FailureKind::Range,
                ..
            }
        ));
        assert!(matches!(
            validate(&question, &json!(2.5)),
            Outcome::Invalid {
                kind: FailureKind::Shape,
                ..
            }
        ));
    }

    #[test]
    fn rank_requires_distinct_full_permutation() {
        let question = Question::rank("q", "t", ["x", "y", "z"]);

        assert_eq!(
            validate(&question, &json!(["z", "x", "y"])),
            Outcome::Valid(json!(["z", "x", "y"]))
        );
        assert!(matches!(
            validate(&question, &json!(["z", "x"])),
            Outcome::Invalid {
                kind: FailureKind::Cardinality,
                ..
            }
        ));
        assert!(matches!(
            validate(&question, &json!(["z", "z", "x"])),
            Outcome::Invalid {
                kind: FailureKind::Shape,
                ..
            }
        ));
    }

    #[test]
    fn budget_sums_with_tolerance_and_zero_fills() {
        let question = Question::budget("q", "t", ["a", "b", "c"], 100.0);

        assert_eq!(
            validate(&question, &json!({ "a": 33.333, "b": 33.333, "c": 33.334 })),
            Outcome::Valid(json!({ "a": 33.33, "b": 33.33, "c": 33.33 }))
        );
        assert_eq!(
            validate(&question, &json!({ "a": 100 })),
            Outcome::Valid(json!({ "a": 100, "b": 0, "c": 0 }))
        );
        assert!(matches!(
            validate(&question, &json!({ "a": 10 })),
            Outcome::Invalid {
                kind: FailureKind::Sum,
                ..
            }
        ));
    }

    #[test]
    fn dict_checks_declared_kinds() {
        let question = Question::dict("q", "t", [("name", ValueKind::String), ("age", ValueKind::Integer)]);

        assert_eq!(
            validate(&question, &json!({ "name": "bo", "age": 3, "extra": true })),
            Outcome::Valid(json!({ "name": "bo", "age": 3 }))
        );
        assert!(matches!(
            validate(&question, &json!({ "name": "bo", "age": "three" })),
            Outcome::Invalid {
                kind: FailureKind::Shape,
                ..
            }
        ));
        assert!(matches!(
            validate(&question, &json!({ "name": "bo" })),
            Outcome::Invalid {
                kind: FailureKind::MissingKey,
                ..
            }
        ));
    }

    #[test]
    fn extract_nulls_missing_fields() {
        let question = Question::extract("q", "t", [("title", ValueKind::String), ("year", ValueKind::Any)]);

        assert_eq!(
            validate(&question, &json!({ "title": "Dune" })),
            Outcome::Valid(json!({ "title": "Dune", "year": null }))
        );
    }

    #[test]
    fn matrix_rows_resolve_columns() {
        let question = Question::matrix("q", "t", ["speed", "price"], ["Good", "Bad"]);

        assert_eq!(
            validate(&question, &json!({ "speed": "good", "price": "Bad" })),
            Outcome::Valid(json!({ "speed": "Good", "price": "Bad" }))
        );
        assert!(matches!(
            validate(&question, &json!({ "speed": "Good" })),
            Outcome::Invalid {
                kind: FailureKind::MissingKey,
                ..
            }
        ));
    }

    #[test]
    fn caller_schema_subset() {
        let question = Question::with_schema(
            "q",
            "t",
            json!({
                "type": "object",
                "properties": { "score": { "type": "integer", "minimum": 0, "maximum": 10 } },
                "required": ["score"],
            }),
        );

        assert!(validate(&question, &json!({ "score": 7 })).is_valid());
        assert!(!validate(&question, &json!({ "score": 11 })).is_valid());
        assert!(!validate(&question, &json!({})).is_valid());
    }
}
