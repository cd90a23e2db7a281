//! Deterministic repair of malformed replies.
//!
//! Strategies run in the order the registry declares them; each produces
//! zero or more candidate answers and never consults a model. The
//! invigilator re-validates every candidate and takes the first that
//! passes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use survey::{Question, QuestionType};

use crate::{
    normalize::resolve_option,
    parse::extract_json,
    spec::{RepairStrategy, spec},
};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap_or_else(|_| unreachable!("static pattern")));

/// Candidate answers recovered from a malformed raw reply, in strategy
/// order, deduplicated.
pub fn repair_candidates(question: &Question, raw: &str) -> Vec<Value> {
    let mut candidates = Vec::new();

    for strategy in spec(question.question_type).repair_strategies {
        let produced = match strategy {
            RepairStrategy::JsonSubstring => json_substring(raw),
            RepairStrategy::MatchOption => match_option(question, raw).into_iter().collect(),
            RepairStrategy::LabelToScale => label_to_scale(question, raw).into_iter().collect(),
            RepairStrategy::FirstNumber => first_number(raw).into_iter().collect(),
            RepairStrategy::SplitDelimited => split_delimited(question, raw).into_iter().collect(),
            RepairStrategy::BracketedSequence => bracketed_sequence(question, raw).into_iter().collect(),
            RepairStrategy::KeyValuePairs => key_value_pairs(question, raw).into_iter().collect(),
        };

        for candidate in produced {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

fn json_substring(raw: &str) -> Vec<Value> {
    let Some(value) = extract_json(raw) else {
        return Vec::new();
    };

    match value {
        // Unwrap an answer envelope if the model nested one.
        Value::Object(mut map) if map.contains_key("answer") => map.remove("answer").into_iter().collect(),
        other => vec![other],
    }
}

/// Exact, then case-insensitive, then substring match against the option
/// labels. Substring prefers the longest matching label.
fn match_option(question: &Question, raw: &str) -> Option<Value> {
    let text = raw.trim().trim_matches(['"', '\'', '.']);

    if let Some(option) = resolve_option(text, &question.question_options) {
        return Some(Value::String(option));
    }

    let lowered = text.to_lowercase();

    question
        .question_options
        .iter()
        .filter(|option| {
            let option_lowered = option.to_lowercase();
            lowered.contains(&option_lowered) || option_lowered.contains(&lowered)
        })
        .max_by_key(|option| option.len())
        .map(|option| Value::String(option.clone()))
}

const POSITIVE: &[&str] = &["love", "like", "great", "good", "excellent", "agree", "yes", "best"];
const NEGATIVE: &[&str] = &["hate", "dislike", "terrible", "bad", "awful", "disagree", "no", "worst"];

fn polarity(text: &str) -> i32 {
    let mut score: i32 = 0;

    for word in text.to_lowercase().split(|c: char| !c.is_ascii_alphanumeric()) {
        if POSITIVE.contains(&word) {
            score += 1;
        } else if NEGATIVE.contains(&word) {
            score -= 1;
        }
    }

    score.signum()
}

/// Resolve a textual reply to a scale value through its labels: exact
/// match, then case-insensitive, then substring overlap, then shared
/// sentiment keywords. Deterministic; ties break toward the lower value.
fn label_to_scale(question: &Question, raw: &str) -> Option<Value> {
    let text = raw.trim().trim_matches(['"', '\'', '.', '!']);
    let lowered = text.to_lowercase();
    let text_polarity = polarity(text);

    let mut best: Option<(i64, i64)> = None;

    for (&value, label) in &question.option_labels {
        let label_lowered = label.to_lowercase();

        let mut score: i64 = 0;

        if label.as_str() == text {
            score += 10_000;
        }

        if label_lowered == lowered {
            score += 1_000;
        }

        if score == 0 && (lowered.contains(&label_lowered) || label_lowered.contains(&lowered)) {
            score += 100;
        }

        if score == 0 {
            let shared = label_lowered
                .split_whitespace()
                .filter(|word| word.len() > 2 && lowered.split_whitespace().any(|w| w == *word))
                .count() as i64;
            score += shared * 10;
        }

        if score == 0 && text_polarity != 0 && polarity(label) == text_polarity {
            score += 5;
        }

        if score > 0 && best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, value));
        }
    }

    best.map(|(_, value)| Value::from(value))
}

fn first_number(raw: &str) -> Option<Value> {
    let matched = NUMBER.find(raw)?.as_str();

    if let Ok(int) = matched.parse::<i64>() {
        return Some(Value::from(int));
    }

    matched.parse::<f64>().ok().map(Value::from)
}

/// Split a prose list on commas, semicolons and newlines, stripping
/// bullets and quotes. Option-backed types resolve each element against
/// the option labels.
fn split_delimited(question: &Question, raw: &str) -> Option<Value> {
    let parts: Vec<String> = raw
        .split([',', ';', '\n'])
        .map(clean_list_item)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        return None;
    }

    let resolved: Vec<Value> = if question.question_type.uses_options() {
        parts
            .iter()
            .filter_map(|part| {
                resolve_option(part, &question.question_options)
                    .or_else(|| match_option(question, part).and_then(|v| v.as_str().map(str::to_string)))
            })
            .map(Value::String)
            .collect()
    } else {
        parts.into_iter().map(Value::String).collect()
    };

    if resolved.is_empty() { None } else { Some(Value::Array(resolved)) }
}

/// Parse the content of the first bracketed sequence, then split it.
fn bracketed_sequence(question: &Question, raw: &str) -> Option<Value> {
    let start = raw.find('[')?;
    let end = raw[start..].find(']')? + start;

    split_delimited(question, &raw[start + 1..end])
}

/// Parse `key: value` (or `key - value`, `key = value`) lines into an
/// object. Values parse as numbers when they look numeric.
fn key_value_pairs(question: &Question, raw: &str) -> Option<Value> {
    let mut map = Map::new();

    for line in raw.lines() {
        let line = clean_list_item(line);

        let Some((key, value)) = line
            .split_once(':')
            .or_else(|| line.split_once('='))
            .or_else(|| line.split_once(" - "))
        else {
            continue;
        };

        let key = key.trim().trim_matches(['"', '\'']).to_string();
        let value = value.trim().trim_matches(['"', '\'', ',']);

        if key.is_empty() || value.is_empty() {
            continue;
        }

        // Budget and matrix keys must be canonical option/row labels;
        // lines that resolve to neither (a trailing "Total: 100", say)
        // are skipped, not fatal to the candidate.
        let key = match question.question_type {
            QuestionType::Budget => {
                let Some(key) = resolve_option(&key, &question.question_options) else {
                    continue;
                };
                key
            }
            QuestionType::Matrix => {
                let Some(key) = resolve_option(&key, &question.matrix_rows) else {
                    continue;
                };
                key
            }
            _ => key,
        };

        let value = match first_number_exact(value) {
            Some(number) => number,
            None => Value::String(value.to_string()),
        };

        map.insert(key, value);
    }

    if map.is_empty() { None } else { Some(Value::Object(map)) }
}

/// A number only when the whole string is numeric, so `"3 stars"` stays
/// a string.
fn first_number_exact(text: &str) -> Option<Value> {
    let matched = NUMBER.find(text)?;

    if matched.as_str().len() != text.len() {
        return None;
    }

    first_number(text)
}

fn clean_list_item(part: &str) -> String {
    part.trim()
        .trim_start_matches(['-', '*', '•'])
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
        .trim()
        .trim_matches(['"', '\''])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use survey::Question;

    use super::*;
    use crate::{Outcome, validate};

    /// Run repair the way the invigilator does: first candidate that
    /// re-validates wins.
    fn repair_and_validate(question: &Question, raw: &str) -> Option<Value> {
        repair_candidates(question, raw)
            .into_iter()
            .find_map(|candidate| validate(question, &candidate).into_valid())
    }

    #[test]
    fn scale_label_resolves_case_insensitively() {
        let question = Question::linear_scale("q", "t", 1, 5).with_labels([(1, "I hate it"), (5, "I love it")]);

        assert_eq!(repair_and_validate(&question, "I LOVE IT"), Some(json!(5)));
        assert_eq!(repair_and_validate(&question, "i hate it."), Some(json!(1)));
    }

    #[test]
    fn scale_sentiment_fallback() {
        let question = Question::linear_scale("q", "t", 1, 5).with_labels([(1, "I hate it"), (5, "I love it")]);

        // No label overlap, but clearly positive.
        assert_eq!(repair_and_validate(&question, "this is excellent"), Some(json!(5)));
    }

    #[test]
    fn scale_number_in_prose() {
        let question = Question::linear_scale("q", "t", 1, 5);

        assert_eq!(repair_and_validate(&question, "I'd say 4 out of 5"), Some(json!(4)));
    }

    #[test]
    fn multiple_choice_substring_match() {
        let question = Question::multiple_choice("q", "t", ["Strongly agree", "Strongly disagree"]);

        assert_eq!(
            repair_and_validate(&question, "I would say I strongly agree with that"),
            Some(json!("Strongly agree"))
        );
    }

    #[test]
    fn checkbox_from_comma_list() {
        let question = Question::checkbox("q", "t", ["apples", "bananas", "cherries"]).with_selection_bounds(1, 3);

        assert_eq!(
            repair_and_validate(&question, "apples, cherries"),
            Some(json!(["apples", "cherries"]))
        );
    }

    #[test]
    fn checkbox_from_bulleted_lines() {
        let question = Question::checkbox("q", "t", ["apples", "bananas", "cherries"]).with_selection_bounds(1, 3);

        assert_eq!(
            repair_and_validate(&question, "- apples\n- bananas"),
            Some(json!(["apples", "bananas"]))
        );
    }

    #[test]
    fn numeric_from_prose() {
        let question = Question::numerical("q", "t");

        assert_eq!(repair_and_validate(&question, "around 42 I think"), Some(json!(42)));
        assert_eq!(repair_and_validate(&question, "3.5 stars"), Some(json!(3.5)));
    }

    #[test]
    fn rank_from_bracketed_sequence() {
        let question = Question::rank("q", "t", ["x", "y", "z"]);

        assert_eq!(
            repair_and_validate(&question, "My ranking: [y, z, x]"),
            Some(json!(["y", "z", "x"]))
        );
    }

    #[test]
    fn budget_from_key_value_lines() {
        let question = Question::budget("q", "t", ["rent", "food"], 100.0);

        assert_eq!(
            repair_and_validate(&question, "rent: 70\nfood: 30"),
            Some(json!({ "rent": 70, "food": 30 }))
        );
    }

    #[test]
    fn budget_key_value_lines_skip_unresolvable_keys() {
        let question = Question::budget("q", "t", ["rent", "food"], 100.0);

        // A trailing summary line is not an option label; it must not sink
        // the lines that parsed fine.
        assert_eq!(
            repair_and_validate(&question, "rent: 70\nfood: 30\nTotal: 100"),
            Some(json!({ "rent": 70, "food": 30 }))
        );
    }

    #[test]
    fn matrix_key_value_lines_skip_unknown_rows() {
        let question = Question::matrix("q", "t", ["speed", "price"], ["Good", "Bad"]);

        assert_eq!(
            repair_and_validate(&question, "speed: Good\nprice: Bad\nOverall: Good"),
            Some(json!({ "speed": "Good", "price": "Bad" }))
        );
    }

    #[test]
    fn list_from_json_substring() {
        let question = Question::list("q", "t");

        assert_eq!(
            repair_and_validate(&question, r#"Here: {"answer": ["a", "b"]}"#),
            Some(json!(["a", "b"]))
        );
    }

    #[test]
    fn unrepairable_text_produces_no_valid_candidate() {
        let question = Question::multiple_choice("q", "t", ["red", "blue"]);

        assert_eq!(repair_and_validate(&question, "purple"), None);
    }
}
