//! Question records and the type catalog.
//!
//! A question is an immutable record; its `question_type` tag selects the
//! answer shape, default templates and repair strategies in the validation
//! registry. Adding a new type means adding a tag here and registering its
//! record there; there is no open-set type hierarchy.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Type tag for every shipped question kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestionType {
    /// Unconstrained string answer.
    FreeText,
    /// One value from `question_options`.
    MultipleChoice,
    /// Multiple choice specialized to Yes/No.
    YesNo,
    /// Multiple choice where an off-list reply is accepted as "other".
    MultipleChoiceWithOther,
    /// Subset of `question_options`, bounded by min/max selections.
    Checkbox,
    /// Checkbox with an exact number of selections.
    TopK,
    /// Integer or float, optionally range-bounded.
    Numerical,
    /// Integer on a labeled scale.
    LinearScale,
    /// Linear scale preset: five agreement labels.
    LikertFive,
    /// Ordered list of strings.
    List,
    /// Mapping with declared keys and value kinds.
    Dict,
    /// Mapping from row labels to one column label each.
    Matrix,
    /// Permutation (or k-prefix) of the options.
    Rank,
    /// Non-negative allocation across the options summing to a budget.
    Budget,
    /// Mapping matching a declared field template.
    Extract,
    /// Multiple choice over a large option set, narrowed for the prompt.
    Dropdown,
    /// Free text rendered as markdown; no structural constraint.
    Markdown,
    /// Template computed locally; no model call.
    Compute,
    /// Answer conforming to a caller-supplied JSON schema.
    PydanticSchema,
}

impl QuestionType {
    /// Whether answers of this type draw from `question_options`.
    pub fn uses_options(self) -> bool {
        matches!(
            self,
            Self::MultipleChoice
                | Self::YesNo
                | Self::MultipleChoiceWithOther
                | Self::Checkbox
                | Self::TopK
                | Self::Rank
                | Self::Budget
                | Self::Dropdown
                | Self::Matrix
                | Self::LikertFive
        )
    }

    /// Whether this type resolves without a model call.
    pub fn is_local(self) -> bool {
        matches!(self, Self::Compute)
    }
}

/// Expected value kind for a declared dict/extract key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Any string.
    String,
    /// Integer or float.
    Number,
    /// Integer only.
    Integer,
    /// Boolean.
    Boolean,
    /// JSON array.
    List,
    /// JSON object.
    Object,
    /// Anything.
    Any,
}

impl ValueKind {
    /// Structural check of a JSON value against this kind.
    pub fn matches(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !matches!(value, Value::Null),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_true(value: &bool) -> bool {
    *value
}

fn default_true() -> bool {
    true
}

/// An immutable survey question.
///
/// Constructed through the per-type constructors ([`Question::free_text`],
/// [`Question::multiple_choice`], ...) which fill in the catalog presets;
/// the `with_*` methods refine constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Question {
    /// Unique name within the survey; must be a valid identifier.
    pub question_name: String,
    /// Type tag selecting the validation registry record.
    pub question_type: QuestionType,
    /// Text template shown to the model. May reference scenario fields,
    /// agent traits and prior answers.
    pub question_text: String,

    /// Closed option set for option-based types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub question_options: Vec<String>,
    /// Row labels for matrix questions; columns are `question_options`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matrix_rows: Vec<String>,
    /// Scale labels for linear-scale questions, keyed by scale value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub option_labels: BTreeMap<i64, String>,
    /// Inclusive scale bounds for linear-scale questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_range: Option<(i64, i64)>,

    /// Minimum number of selections (checkbox/top_k/rank).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<usize>,
    /// Maximum number of selections (checkbox/top_k/rank).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<usize>,
    /// Minimum numeric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Maximum numeric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Minimum list length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_list_items: Option<usize>,
    /// Maximum list length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_list_items: Option<usize>,
    /// Total a budget allocation must sum to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_sum: Option<f64>,

    /// Declared keys and value kinds for dict/extract answers.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub answer_keys: IndexMap<String, ValueKind>,
    /// Caller-supplied JSON schema for `pydantic_schema` questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_schema: Option<serde_json::Value>,
    /// Local template for `compute` questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_template: Option<String>,

    /// Relax closed-set and cardinality constraints while keeping
    /// structural validation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub permissive: bool,
    /// Ask the model for a free-form comment alongside the answer.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub include_comment: bool,

    /// Override for the answering-instructions template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answering_instructions: Option<String>,
    /// Override for the question-presentation template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_presentation: Option<String>,
}

impl Question {
    fn base(name: impl Into<String>, question_type: QuestionType, text: impl Into<String>) -> Self {
        Self {
            question_name: name.into(),
            question_type,
            question_text: text.into(),
            question_options: Vec::new(),
            matrix_rows: Vec::new(),
            option_labels: BTreeMap::new(),
            scale_range: None,
            min_selections: None,
            max_selections: None,
            min_value: None,
            max_value: None,
            min_list_items: None,
            max_list_items: None,
            budget_sum: None,
            answer_keys: IndexMap::new(),
            answer_schema: None,
            compute_template: None,
            permissive: false,
            include_comment: true,
            answering_instructions: None,
            question_presentation: None,
        }
    }

    /// Unconstrained text question.
    pub fn free_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::base(name, QuestionType::FreeText, text)
    }

    /// Single choice from a closed option set.
    pub fn multiple_choice(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::MultipleChoice, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question
    }

    /// Yes/No preset.
    pub fn yes_no(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut question = Self::base(name, QuestionType::YesNo, text);
        question.question_options = vec!["Yes".to_string(), "No".to_string()];
        question
    }

    /// Multiple choice accepting an off-list "other" reply.
    pub fn multiple_choice_with_other(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::MultipleChoiceWithOther, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question.permissive = true;
        question
    }

    /// Subset selection from a closed option set.
    pub fn checkbox(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Checkbox, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question
    }

    /// Checkbox preset requiring exactly `k` selections.
    pub fn top_k(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
        k: usize,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::TopK, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question.min_selections = Some(k);
        question.max_selections = Some(k);
        question
    }

    /// Numeric answer.
    pub fn numerical(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::base(name, QuestionType::Numerical, text)
    }

    /// Integer on an inclusive labeled scale.
    pub fn linear_scale(name: impl Into<String>, text: impl Into<String>, lo: i64, hi: i64) -> Self {
        let mut question = Self::base(name, QuestionType::LinearScale, text);
        question.scale_range = Some((lo, hi));
        question
    }

    /// Five-point agreement scale preset.
    pub fn likert_five(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut question = Self::base(name, QuestionType::LikertFive, text);
        question.question_options = [
            "Strongly disagree",
            "Disagree",
            "Neutral",
            "Agree",
            "Strongly agree",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        question
    }

    /// Ordered list of strings.
    pub fn list(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::base(name, QuestionType::List, text)
    }

    /// Mapping with declared keys.
    pub fn dict(
        name: impl Into<String>,
        text: impl Into<String>,
        keys: impl IntoIterator<Item = (impl Into<String>, ValueKind)>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Dict, text);
        question.answer_keys = keys.into_iter().map(|(k, v)| (k.into(), v)).collect();
        question
    }

    /// Row-by-column single choice grid.
    pub fn matrix(
        name: impl Into<String>,
        text: impl Into<String>,
        rows: impl IntoIterator<Item = impl Into<String>>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Matrix, text);
        question.matrix_rows = rows.into_iter().map(Into::into).collect();
        question.question_options = columns.into_iter().map(Into::into).collect();
        question
    }

    /// Ranking of the options.
    pub fn rank(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Rank, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question
    }

    /// Allocation across the options summing to `budget`.
    pub fn budget(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
        budget: f64,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Budget, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question.budget_sum = Some(budget);
        question
    }

    /// Field extraction against a declared key template.
    pub fn extract(
        name: impl Into<String>,
        text: impl Into<String>,
        keys: impl IntoIterator<Item = (impl Into<String>, ValueKind)>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Extract, text);
        question.answer_keys = keys.into_iter().map(|(k, v)| (k.into(), v)).collect();
        question
    }

    /// Single choice over a large option set.
    pub fn dropdown(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut question = Self::base(name, QuestionType::Dropdown, text);
        question.question_options = options.into_iter().map(Into::into).collect();
        question
    }

    /// Markdown answer, structurally unconstrained.
    pub fn markdown(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::base(name, QuestionType::Markdown, text)
    }

    /// Locally computed template; never calls a model.
    pub fn compute(name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        let mut question = Self::base(name, QuestionType::Compute, template.clone());
        question.compute_template = Some(template);
        question.include_comment = false;
        question
    }

    /// Answer bound to a caller-supplied JSON schema.
    pub fn with_schema(name: impl Into<String>, text: impl Into<String>, schema: serde_json::Value) -> Self {
        let mut question = Self::base(name, QuestionType::PydanticSchema, text);
        question.answer_schema = Some(schema);
        question
    }

    /// Bound the number of selections.
    pub fn with_selection_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_selections = Some(min);
        self.max_selections = Some(max);
        self
    }

    /// Bound a numeric answer.
    pub fn with_value_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Bound a list answer's length.
    pub fn with_list_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_list_items = Some(min);
        self.max_list_items = Some(max);
        self
    }

    /// Attach labels to linear-scale values.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = (i64, impl Into<String>)>) -> Self {
        self.option_labels = labels.into_iter().map(|(k, v)| (k, v.into())).collect();
        self
    }

    /// Relax constraint enforcement while keeping structural validation.
    pub fn permissive(mut self) -> Self {
        self.permissive = true;
        self
    }

    /// Skip the free-form comment field for this question.
    pub fn without_comment(mut self) -> Self {
        self.include_comment = false;
        self
    }

    /// Override the answering-instructions template.
    pub fn with_answering_instructions(mut self, template: impl Into<String>) -> Self {
        self.answering_instructions = Some(template.into());
        self
    }
}

/// Whether a string is a valid question/identifier name.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
