use thiserror::Error;

/// A single record failed normalisation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("field `{field}` must be a {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    /// The offending field, if the error is attributable to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::MissingField { field } => Some(field),
            ValidationError::InvalidField { field, .. } => Some(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity kind: {0}")]
pub struct UnknownKind(pub String);
