use survey::QuestionType;

/// Structural shape an answer of some type must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    /// A string.
    Text,
    /// One value from the option set.
    OneOption,
    /// A subset of the option set.
    OptionSubset,
    /// An integer or float.
    Number,
    /// An integer.
    Integer,
    /// An ordered list of strings.
    TextList,
    /// A mapping with declared keys.
    KeyedMap,
    /// A mapping from row labels to option labels.
    RowChoices,
    /// A permutation (or prefix) of the option set.
    Permutation,
    /// A non-negative allocation over the option set.
    Allocation,
    /// Whatever the caller-supplied schema says.
    SchemaBound,
    /// No structural constraint.
    Unconstrained,
}

/// Deterministic repair strategies, applied in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// Extract and parse the first JSON-looking substring.
    JsonSubstring,
    /// Match the reply against option labels: exact, then
    /// case-insensitive, then substring.
    MatchOption,
    /// Resolve a scale label to its integer via scored matching.
    LabelToScale,
    /// Regex-extract the first integer or float.
    FirstNumber,
    /// Split on commas/newlines and resolve each element.
    SplitDelimited,
    /// Parse a bracketed or delimited sequence.
    BracketedSequence,
    /// Parse `key: value` lines into a mapping.
    KeyValuePairs,
}

/// The registry record for one question type: its identity, answer shape,
/// default templates and repair strategies. Adding a question type means
/// adding a tag and one of these records.
#[derive(Debug, Clone, Copy)]
pub struct TypeSpec {
    /// Stable identifier, equal to the serialized type tag.
    pub id: &'static str,
    /// Expected structural shape.
    pub answer_shape: AnswerShape,
    /// Default answering-instructions template. Rendered with a `question`
    /// root exposing the option set and constraints.
    pub default_instructions: &'static str,
    /// Ordered repair strategies for malformed replies.
    pub repair_strategies: &'static [RepairStrategy],
}

const JSON_REPLY: &str = r#"Reply with only a JSON object of the form {"answer": <answer>, "comment": "<brief comment>"}."#;

static FREE_TEXT: TypeSpec = TypeSpec {
    id: "free_text",
    answer_shape: AnswerShape::Text,
    default_instructions: r#"Reply with only a JSON object of the form {"answer": "<your reply>", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring],
};

static MULTIPLE_CHOICE: TypeSpec = TypeSpec {
    id: "multiple_choice",
    answer_shape: AnswerShape::OneOption,
    default_instructions: r#"Choose exactly one of the following options: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": "<chosen option>", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::MatchOption],
};

static YES_NO: TypeSpec = TypeSpec {
    id: "yes_no",
    answer_shape: AnswerShape::OneOption,
    default_instructions: r#"Answer "Yes" or "No".
Reply with only a JSON object of the form {"answer": "Yes" | "No", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::MatchOption],
};

static MULTIPLE_CHOICE_WITH_OTHER: TypeSpec = TypeSpec {
    id: "multiple_choice_with_other",
    answer_shape: AnswerShape::OneOption,
    default_instructions: r#"Choose one of the following options, or reply with your own answer: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": "<option or other>", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::MatchOption],
};

static CHECKBOX: TypeSpec = TypeSpec {
    id: "checkbox",
    answer_shape: AnswerShape::OptionSubset,
    default_instructions: r#"Choose from the following options: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": ["<option>", ...], "comment": "<brief comment>"}."#,
    repair_strategies: &[
        RepairStrategy::JsonSubstring,
        RepairStrategy::SplitDelimited,
        RepairStrategy::MatchOption,
    ],
};

static TOP_K: TypeSpec = TypeSpec {
    id: "top_k",
    answer_shape: AnswerShape::OptionSubset,
    default_instructions: r#"Choose exactly {{ question.min_selections }} of the following options: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": ["<option>", ...], "comment": "<brief comment>"}."#,
    repair_strategies: &[
        RepairStrategy::JsonSubstring,
        RepairStrategy::SplitDelimited,
        RepairStrategy::MatchOption,
    ],
};

static NUMERICAL: TypeSpec = TypeSpec {
    id: "numerical",
    answer_shape: AnswerShape::Number,
    default_instructions: r#"Answer with a single number.
Reply with only a JSON object of the form {"answer": <number>, "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::FirstNumber],
};

static LINEAR_SCALE: TypeSpec = TypeSpec {
    id: "linear_scale",
    answer_shape: AnswerShape::Integer,
    default_instructions: r#"Answer with a whole number on the given scale.
Reply with only a JSON object of the form {"answer": <integer>, "comment": "<brief comment>"}."#,
    repair_strategies: &[
        RepairStrategy::JsonSubstring,
        RepairStrategy::FirstNumber,
        RepairStrategy::LabelToScale,
    ],
};

static LIKERT_FIVE: TypeSpec = TypeSpec {
    id: "likert_five",
    answer_shape: AnswerShape::OneOption,
    default_instructions: r#"Choose exactly one of: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": "<chosen option>", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::MatchOption],
};

static LIST: TypeSpec = TypeSpec {
    id: "list",
    answer_shape: AnswerShape::TextList,
    default_instructions: r#"Reply with only a JSON object of the form {"answer": ["<item>", ...], "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::SplitDelimited],
};

static DICT: TypeSpec = TypeSpec {
    id: "dict",
    answer_shape: AnswerShape::KeyedMap,
    default_instructions: r#"Provide a value for each of the keys: {{ question.answer_keys }}.
Reply with only a JSON object of the form {"answer": {"<key>": <value>, ...}, "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::KeyValuePairs],
};

static MATRIX: TypeSpec = TypeSpec {
    id: "matrix",
    answer_shape: AnswerShape::RowChoices,
    default_instructions: r#"For each row in {{ question.matrix_rows }}, choose one of: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": {"<row>": "<option>", ...}, "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::KeyValuePairs],
};

static RANK: TypeSpec = TypeSpec {
    id: "rank",
    answer_shape: AnswerShape::Permutation,
    default_instructions: r#"Rank the following options from best to worst: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": ["<best>", ...], "comment": "<brief comment>"}."#,
    repair_strategies: &[
        RepairStrategy::JsonSubstring,
        RepairStrategy::BracketedSequence,
        RepairStrategy::SplitDelimited,
    ],
};

static BUDGET: TypeSpec = TypeSpec {
    id: "budget",
    answer_shape: AnswerShape::Allocation,
    default_instructions: r#"Allocate a total of {{ question.budget_sum }} across the options: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": {"<option>": <amount>, ...}, "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::KeyValuePairs],
};

static EXTRACT: TypeSpec = TypeSpec {
    id: "extract",
    answer_shape: AnswerShape::KeyedMap,
    default_instructions: r#"Extract a value for each of the keys: {{ question.answer_keys }}. Use null when a value is not present.
Reply with only a JSON object of the form {"answer": {"<key>": <value>, ...}, "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::KeyValuePairs],
};

static DROPDOWN: TypeSpec = TypeSpec {
    id: "dropdown",
    answer_shape: AnswerShape::OneOption,
    default_instructions: r#"Choose exactly one of the following options: {{ question.question_options }}.
Reply with only a JSON object of the form {"answer": "<chosen option>", "comment": "<brief comment>"}."#,
    repair_strategies: &[RepairStrategy::JsonSubstring, RepairStrategy::MatchOption],
};

static MARKDOWN: TypeSpec = TypeSpec {
    id: "markdown",
    answer_shape: AnswerShape::Text,
    default_instructions: JSON_REPLY,
    repair_strategies: &[RepairStrategy::JsonSubstring],
};

static COMPUTE: TypeSpec = TypeSpec {
    id: "compute",
    answer_shape: AnswerShape::Unconstrained,
    default_instructions: "",
    repair_strategies: &[],
};

static PYDANTIC_SCHEMA: TypeSpec = TypeSpec {
    id: "pydantic_schema",
    answer_shape: AnswerShape::SchemaBound,
    default_instructions: JSON_REPLY,
    repair_strategies: &[RepairStrategy::JsonSubstring],
};

/// The registry record for a question type.
pub fn spec(question_type: QuestionType) -> &'static TypeSpec {
    match question_type {
        QuestionType::FreeText => &FREE_TEXT,
        QuestionType::MultipleChoice => &MULTIPLE_CHOICE,
        QuestionType::YesNo => &YES_NO,
        QuestionType::MultipleChoiceWithOther => &MULTIPLE_CHOICE_WITH_OTHER,
        QuestionType::Checkbox => &CHECKBOX,
        QuestionType::TopK => &TOP_K,
        QuestionType::Numerical => &NUMERICAL,
        QuestionType::LinearScale => &LINEAR_SCALE,
        QuestionType::LikertFive => &LIKERT_FIVE,
        QuestionType::List => &LIST,
        QuestionType::Dict => &DICT,
        QuestionType::Matrix => &MATRIX,
        QuestionType::Rank => &RANK,
        QuestionType::Budget => &BUDGET,
        QuestionType::Extract => &EXTRACT,
        QuestionType::Dropdown => &DROPDOWN,
        QuestionType::Markdown => &MARKDOWN,
        QuestionType::Compute => &COMPUTE,
        QuestionType::PydanticSchema => &PYDANTIC_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use survey::QuestionType;

    use super::spec;

    #[test]
    fn ids_match_serialized_type_tags() {
        for question_type in [
            QuestionType::FreeText,
            QuestionType::MultipleChoice,
            QuestionType::LinearScale,
            QuestionType::PydanticSchema,
        ] {
            assert_eq!(spec(question_type).id, question_type.to_string());
        }
    }
}
