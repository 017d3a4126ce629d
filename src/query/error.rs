//! Errors raised while deriving and rendering repository queries.

use std::fmt;

/// Query derivation error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The predicate kind has no condition mapping
    UnsupportedOperator(String),
    /// Fewer bound values remain than the predicate requires
    ParameterArity {
        property: String,
        required: usize,
        remaining: usize,
    },
    /// Bound values were left over after every predicate was built
    ParameterCount { consumed: usize, supplied: usize },
    /// A caller argument does not fit the method's parameter layout
    InvalidArgument(String),
    /// A repository method descriptor is inconsistent
    InvalidMethod(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnsupportedOperator(kind) => {
                write!(f, "Unsupported keyword: {kind}")
            }
            QueryError::ParameterArity {
                property,
                required,
                remaining,
            } => {
                write!(
                    f,
                    "Predicate on '{property}' requires {required} parameter(s), only {remaining} remaining"
                )
            }
            QueryError::ParameterCount { consumed, supplied } => {
                write!(
                    f,
                    "Query consumed {consumed} parameter(s) but {supplied} were supplied"
                )
            }
            QueryError::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            QueryError::InvalidMethod(s) => write!(f, "Invalid query method: {s}"),
        }
    }
}

impl std::error::Error for QueryError {}
