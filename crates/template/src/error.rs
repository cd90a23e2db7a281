use thiserror::Error;

/// Errors produced while compiling or rendering a template.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    /// The template source is syntactically invalid.
    #[error("Template syntax error: {detail}")]
    Syntax {
        /// What the parser stumbled over.
        detail: String,
    },

    /// A placeholder referenced a name the context cannot resolve.
    #[error("Unresolved template placeholder '{{{{ {path} }}}}'")]
    UnresolvedPlaceholder {
        /// The placeholder path as written in the source.
        path: String,
    },
}
