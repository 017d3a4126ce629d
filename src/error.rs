//! Crate-level error returned by repository calls.

use crate::query::QueryError;
use crate::session::SessionError;
use crate::transaction::TransactionError;
use std::fmt;

/// Any failure of a repository call
///
/// Wrapped errors keep their own message; no context is added.
#[derive(Debug)]
pub enum RepositoryError {
    Query(QueryError),
    Session(SessionError),
    Transaction(TransactionError),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::Query(e) => write!(f, "{e}"),
            RepositoryError::Session(e) => write!(f, "{e}"),
            RepositoryError::Transaction(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::Query(e) => Some(e),
            RepositoryError::Session(e) => Some(e),
            RepositoryError::Transaction(e) => Some(e),
        }
    }
}

impl From<QueryError> for RepositoryError {
    fn from(err: QueryError) -> Self {
        RepositoryError::Query(err)
    }
}

impl From<SessionError> for RepositoryError {
    fn from(err: SessionError) -> Self {
        RepositoryError::Session(err)
    }
}

impl From<TransactionError> for RepositoryError {
    fn from(err: TransactionError) -> Self {
        RepositoryError::Transaction(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_messages_are_unchanged() {
        let inner = QueryError::UnsupportedOperator("Near".to_string());
        let message = inner.to_string();
        assert_eq!(RepositoryError::from(inner).to_string(), message);

        let inner = TransactionError::IllegalState("no active transaction".to_string());
        let message = inner.to_string();
        assert_eq!(RepositoryError::from(inner).to_string(), message);

        let err = RepositoryError::from(SessionError::Closed);
        assert_eq!(err.to_string(), "Session is closed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
