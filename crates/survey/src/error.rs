use thiserror::Error;

/// Errors raised while constructing or validating a survey. All of these
/// are fatal: a survey that fails construction never runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurveyError {
    /// A question name does not match the identifier grammar.
    #[error("Invalid question name '{0}': names must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidQuestionName(String),

    /// Two questions share a name.
    #[error("Duplicate question name '{0}'")]
    DuplicateQuestionName(String),

    /// A rule references an unknown question.
    #[error("Rule references unknown question '{0}'")]
    UnknownQuestion(String),

    /// A rule's from-index or target index is out of range.
    #[error("Rule index {index} is out of range for {len} questions")]
    RuleIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of questions in the survey.
        len: usize,
    },

    /// A rule predicate failed to parse.
    #[error("Failed to parse rule predicate '{expression}': {detail}")]
    RuleParse {
        /// The predicate source.
        expression: String,
        /// What the parser stumbled over.
        detail: String,
    },

    /// A memory declaration points at itself or forward.
    #[error("Memory for '{question}' references '{prior}', which does not come before it")]
    MemoryCycle {
        /// The question declaring the memory.
        question: String,
        /// The prior it illegally references.
        prior: String,
    },

    /// A question group span is malformed or out of range.
    #[error("Question group '{name}' spans invalid range {start}..={end}")]
    InvalidGroup {
        /// Group name.
        name: String,
        /// First index of the span.
        start: usize,
        /// Last index of the span.
        end: usize,
    },

    /// A survey must contain at least one question.
    #[error("A survey requires at least one question")]
    Empty,

    /// The persisted document version is not supported.
    #[error("Unsupported survey document version '{0}'")]
    UnsupportedVersion(String),

    /// The persisted document is structurally invalid.
    #[error("Malformed survey document: {0}")]
    MalformedDocument(String),
}
