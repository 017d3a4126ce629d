//! # Lifeline
//!
//! Derived repository queries and transactional session coordination on top
//! of `may_postgres` and SeaQuery.
//!
//! - [`query`]: predicate fragments to conditions, SQL rendering, and the
//!   execution strategies (collection, single, count, paged)
//! - [`transaction`]: session binding, participation, suspend/resume and
//!   guaranteed cleanup, with context passed explicitly
//! - [`repository`]: binds a method description once and runs calls inside a
//!   transaction boundary
//!
//! ```no_run
//! use lifeline::query::{Argument, Parameters, Part, PartTree, PartType, QueryExecution};
//! use lifeline::{DatabaseConfig, Repository, TransactionContext};
//!
//! let config = DatabaseConfig::load()?;
//! let repo = Repository::from_config(&config);
//! let find_by_last_name = repo.derived_query(
//!     "findByLastName",
//!     PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]),
//!     "person",
//!     QueryExecution::Collection,
//!     Parameters::new(1),
//! )?;
//!
//! let mut ctx = TransactionContext::new();
//! let rows = repo.execute(&mut ctx, &find_by_last_name, vec![Argument::value("Naskou")])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod query;
pub mod repository;
pub mod session;
pub mod transaction;

#[cfg(test)]
mod test_helpers;

pub use config::DatabaseConfig;
pub use connection::{connect, validate_connection_string, ConnectionError};
pub use error::RepositoryError;
pub use query::{
    Argument, Page, Pageable, Parameters, QueryError, QueryExecution, QueryOptions, QueryResult,
    Sort,
};
pub use repository::{QuerySource, Repository, RepositoryQuery};
pub use sea_query::Value;
pub use session::{MayPostgresSession, MayPostgresSessionFactory, Session, SessionError, SessionFactory};
pub use transaction::{
    Propagation, TransactionContext, TransactionDefinition, TransactionError, TransactionManager,
    TransactionOutcome, TransactionState,
};
