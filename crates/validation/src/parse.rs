//! Decoding of raw model text into a candidate `{answer, comment}` pair.

use serde_json::Value;

/// The answer/comment pair decoded from a raw model reply, before
/// validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    /// The candidate answer value, if any could be decoded.
    pub answer: Option<Value>,
    /// Free-form comment accompanying the answer.
    pub comment: Option<String>,
}

/// Decode a raw reply. Models are instructed to return
/// `{"answer": ..., "comment": ...}`; this tolerates code fences, leading
/// prose around an embedded JSON object, and plain-text replies (which
/// become a string answer for the validator to judge).
pub fn parse_raw(raw: &str) -> ParsedResponse {
    let text = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return from_value(value);
    }

    if let Some(value) = extract_json(text) {
        return from_value(value);
    }

    ParsedResponse {
        answer: Some(Value::String(text.to_string())),
        comment: None,
    }
}

fn from_value(value: Value) -> ParsedResponse {
    let Value::Object(mut map) = value else {
        return ParsedResponse {
            answer: Some(value),
            comment: None,
        };
    };

    match map.remove("answer") {
        Some(answer) => ParsedResponse {
            answer: Some(answer),
            comment: map.remove("comment").and_then(|c| c.as_str().map(str::to_string)),
        },
        // An object without an "answer" key is itself the answer
        // (dict/matrix/budget replies often come back bare).
        None => ParsedResponse {
            answer: Some(Value::Object(map)),
            comment: None,
        },
    }
}

/// The first balanced JSON object or array embedded in the text.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        let start = match text.find(open) {
            Some(start) => start,
            None => continue,
        };

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, c) in text[start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }

            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                c if c == open && !in_string => depth += 1,
                c if c == close && !in_string => {
                    depth -= 1;

                    if depth == 0 {
                        let candidate = &text[start..start + offset + c.len_utf8()];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    None
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Skip an optional language tag on the fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn well_formed_json_reply() {
        let parsed = parse_raw(r#"{"answer": "hello", "comment": "hi"}"#);

        assert_eq!(parsed.answer, Some(json!("hello")));
        assert_eq!(parsed.comment, Some("hi".to_string()));
    }

    #[test]
    fn code_fenced_reply() {
        let parsed = parse_raw("```json\n{\"answer\": 5}\n```");
        assert_eq!(parsed.answer, Some(json!(5)));
    }

    #[test]
    fn embedded_json_with_prose() {
        let parsed = parse_raw(r#"Sure! Here you go: {"answer": ["a", "b"]} hope that helps"#);
        assert_eq!(parsed.answer, Some(json!(["a", "b"])));
    }

    #[test]
    fn bare_object_is_the_answer() {
        let parsed = parse_raw(r#"{"speed": "Good", "price": "Bad"}"#);
        assert_eq!(parsed.answer, Some(json!({ "speed": "Good", "price": "Bad" })));
    }

    #[test]
    fn plain_text_falls_back_to_string() {
        let parsed = parse_raw("  just some text  ");
        assert_eq!(parsed.answer, Some(json!("just some text")));
        assert_eq!(parsed.comment, None);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let parsed = parse_raw(r#"note: {"answer": "a } b"} end"#);
        assert_eq!(parsed.answer, Some(json!("a } b")));
    }
}
