//! Minimal mustache-style template engine for prompt rendering.
//!
//! Supports `{{ a.b.c }}` lookups and `{{ a[i] }}` indexing over a context
//! of JSON values. Deliberately excludes macros, inheritance and control
//! flow; prompts need substitution, nothing more. Compiled templates are
//! cached process-wide, keyed by source text.

mod context;
mod error;
mod parse;

use std::sync::{Arc, LazyLock};

pub use context::TemplateContext;
pub use error::TemplateError;
use mini_moka::sync::Cache;
use parse::Segment;

/// Compiled templates kept hot across renders. Prompt templates repeat for
/// every interview of a job, so the hit rate is effectively 100% after the
/// first turn.
static COMPILED: LazyLock<Cache<String, Arc<Template>>> =
    LazyLock::new(|| Cache::builder().max_capacity(2048).build());

/// A parsed template ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse the template source into literal and placeholder segments.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        parse::parse(source).map(|segments| Self { segments })
    }

    /// Compile through the process-wide cache.
    pub fn compile_cached(source: &str) -> Result<Arc<Self>, TemplateError> {
        if let Some(template) = COMPILED.get(&source.to_string()) {
            return Ok(template);
        }

        let template = Arc::new(Self::compile(source)?);
        COMPILED.insert(source.to_string(), template.clone());

        Ok(template)
    }

    /// Substitute every placeholder from the context.
    ///
    /// Fails with [`TemplateError::UnresolvedPlaceholder`] when a referenced
    /// path has no value, so callers surface broken piping instead of
    /// emitting prompts with holes.
    pub fn render(&self, context: &TemplateContext) -> Result<String, TemplateError> {
        let mut output = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder { path, raw } => {
                    let value = context
                        .resolve(path)
                        .ok_or_else(|| TemplateError::UnresolvedPlaceholder { path: raw.clone() })?;

                    output.push_str(&render_value(value));
                }
            }
        }

        Ok(output)
    }

    /// Paths referenced by this template, in order of appearance.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { raw, .. } => Some(raw.as_str()),
            Segment::Literal(_) => None,
        })
    }

}

/// One-shot convenience over [`Template::compile_cached`] + render.
pub fn render(source: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    // Skip parsing entirely for placeholder-free sources.
    if !source.contains("{{") && !source.contains("}}") {
        return Ok(source.to_string());
    }

    Template::compile_cached(source)?.render(context)
}

/// Whether the source contains any placeholder syntax.
pub fn has_placeholders(source: &str) -> bool {
    source.contains("{{")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> TemplateContext {
        let mut context = TemplateContext::new();
        context.insert("scenario", json!({ "topic": "cats", "tags": ["a", "b"] }));
        context.insert("agent", json!({ "age": 30, "vegan": true }));
        context.insert("q1", json!({ "answer": "I like dogs", "comment": null }));
        context
    }

    #[test]
    fn literal_passthrough() {
        let out = render("no placeholders here", &context()).unwrap();
        assert_eq!(out, "no placeholders here");
    }

    #[test]
    fn dotted_lookup() {
        let out = render("Topic: {{ scenario.topic }}, age {{ agent.age }}", &context()).unwrap();
        assert_eq!(out, "Topic: cats, age 30");
    }

    #[test]
    fn indexed_lookup() {
        let out = render("first tag: {{ scenario.tags[0] }}", &context()).unwrap();
        assert_eq!(out, "first tag: a");
    }

    #[test]
    fn prior_answer_piping() {
        let out = render("Expand on: {{ q1.answer }}", &context()).unwrap();
        assert_eq!(out, "Expand on: I like dogs");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let out = render("vegan={{ agent.vegan }} tags={{ scenario.tags }}", &context()).unwrap();
        assert_eq!(out, r#"vegan=true tags=["a","b"]"#);
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let err = render("{{ q2.answer }}", &context()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedPlaceholder { path } if path == "q2.answer"));
    }

    #[test]
    fn unbalanced_braces_are_a_syntax_error() {
        let err = render("{{ scenario.topic", &context()).unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));

        let err = render("dangling }} close", &context()).unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn compiled_cache_returns_shared_instance() {
        let a = Template::compile_cached("cache me: {{ agent.age }}").unwrap();
        let b = Template::compile_cached("cache me: {{ agent.age }}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
