use crate::number::ParseNumberError;

/// Assembly-time failure.
///
/// Every variant indicates a defect in the program being assembled, so these
/// fail fast at the offending call (or at `finalize` for unresolved labels)
/// and are never something to recover from at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembleError {
    /// A variable name was declared twice.
    DuplicateVariable(String),
    /// A label name was bound twice.
    DuplicateLabel(String),
    /// A variable was referenced before being declared.
    UnknownVariable(String),
    /// A goto named a label that was never bound.
    UnresolvedLabel(String),
    /// A number literal passed to `emit_number` did not parse.
    InvalidNumber {
        text: String,
        reason: ParseNumberError,
    },
}

impl AssembleError {
    pub fn invalid_number(text: &str, reason: ParseNumberError) -> Self {
        AssembleError::InvalidNumber {
            text: text.to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assemble error: ")?;
        match self {
            AssembleError::DuplicateVariable(name) => {
                write!(f, "variable '{}' is already declared", name)
            }
            AssembleError::DuplicateLabel(name) => {
                write!(f, "label '{}' is already bound", name)
            }
            AssembleError::UnknownVariable(name) => {
                write!(f, "variable '{}' was never declared", name)
            }
            AssembleError::UnresolvedLabel(name) => {
                write!(f, "goto references unbound label '{}'", name)
            }
            AssembleError::InvalidNumber { text, reason } => {
                write!(f, "cannot assemble number literal '{}': {}", text, reason)
            }
        }
    }
}

impl std::error::Error for AssembleError {}
