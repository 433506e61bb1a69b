use thiserror::Error;

// ---------------------------------------------------------------------------
// Engine error types
// ---------------------------------------------------------------------------

/// A range expression field could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A field that is not an integer, `a-b` range or `start:stop:step` slice.
    #[error("invalid range field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Slice step of zero, which would never advance.
    #[error("slice step cannot be zero in '{field}'")]
    ZeroStep { field: String },
}

impl ParseError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reasons a curve fit cannot produce a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("{kind} fit needs at least {min} points, got {got}")]
    InsufficientData {
        kind: &'static str,
        got: usize,
        min: usize,
    },

    #[error("{0} fit is singular for the given data")]
    Singular(&'static str),

    #[error("invalid custom expression: {0}")]
    Expression(String),

    #[error("unknown fit kind '{0}'")]
    UnknownKind(String),

    #[error("invalid fit parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid fit input: {0}")]
    InvalidInput(String),
}

/// The caller declined to resolve a naming collision; nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch write of '{name}' cancelled: {collisions} existing series would be overwritten")]
pub struct OverwriteAborted {
    pub name: String,
    pub collisions: usize,
}
