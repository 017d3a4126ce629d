//! Repository query binding and transactional execution.
//!
//! A [`RepositoryQuery`] is built once per repository method and reused for
//! every call. [`Repository`] runs calls inside a transaction boundary that
//! joins the caller's transaction when one is active.

use crate::config::DatabaseConfig;
use crate::error::RepositoryError;
use crate::query::execution::{self, Argument, Parameters, QueryCreator, QueryExecution, QueryMethod, QueryResult};
use crate::query::{PartTree, PartTreeQuery, QueryError, QueryOptions, StringQuery};
use crate::session::{MayPostgresSessionFactory, Session, SessionFactory};
use crate::transaction::{TransactionContext, TransactionDefinition, TransactionManager};

/// Where a method's SQL comes from
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    /// Derived from the method name
    Derived(PartTreeQuery),
    /// Declared as text on the method
    Annotated(StringQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryQuery {
    method: QueryMethod,
    source: QuerySource,
}

impl RepositoryQuery {
    /// Bind a derived query. A count projection always executes as a count.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperator` if the tree uses a keyword without a mapping,
    /// `InvalidMethod` if the parameter layout does not fit the execution.
    pub fn derived(
        name: impl Into<String>,
        query: PartTreeQuery,
        execution: QueryExecution,
        parameters: Parameters,
    ) -> Result<Self, QueryError> {
        if let Some(part) = query.tree().parts().find(|p| !p.part_type().is_supported()) {
            return Err(QueryError::UnsupportedOperator(part.part_type().to_string()));
        }
        let execution = if query.tree().is_count_projection() {
            QueryExecution::Count
        } else {
            execution
        };
        Ok(Self {
            method: QueryMethod::new(name, execution, parameters)?,
            source: QuerySource::Derived(query),
        })
    }

    /// Bind a query declared as text. A text flagged as count executes as a count.
    pub fn annotated(
        name: impl Into<String>,
        query: StringQuery,
        execution: QueryExecution,
        parameters: Parameters,
    ) -> Result<Self, QueryError> {
        let execution = if query.is_count_query() {
            QueryExecution::Count
        } else {
            execution
        };
        Ok(Self {
            method: QueryMethod::new(name, execution, parameters)?,
            source: QuerySource::Annotated(query),
        })
    }

    pub fn method(&self) -> &QueryMethod {
        &self.method
    }

    pub fn source(&self) -> &QuerySource {
        &self.source
    }

    fn creator(&self) -> &dyn QueryCreator {
        match &self.source {
            QuerySource::Derived(q) => q,
            QuerySource::Annotated(q) => q,
        }
    }

    /// Run on an already bound session, outside any transaction handling
    pub fn execute<S: Session>(
        &self,
        session: &S,
        args: Vec<Argument>,
    ) -> Result<QueryResult<S::Row>, RepositoryError> {
        log::debug!("Executing {}", self.method.name());
        execution::execute(&self.method, self.creator(), session, args)
    }
}

pub struct Repository<F: SessionFactory> {
    manager: TransactionManager<F>,
    options: QueryOptions,
}

impl Repository<MayPostgresSessionFactory> {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(
            MayPostgresSessionFactory::from_config(config),
            config.query_options(),
        )
    }
}

impl<F: SessionFactory> Repository<F> {
    pub fn new(factory: F, options: QueryOptions) -> Self {
        Self {
            manager: TransactionManager::new(factory),
            options,
        }
    }

    pub fn manager(&self) -> &TransactionManager<F> {
        &self.manager
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Bind a derived query on `storage` with this repository's options
    pub fn derived_query(
        &self,
        name: impl Into<String>,
        tree: PartTree,
        storage: impl Into<String>,
        execution: QueryExecution,
        parameters: Parameters,
    ) -> Result<RepositoryQuery, QueryError> {
        let query = PartTreeQuery::new(tree, storage, self.options.clone());
        RepositoryQuery::derived(name, query, execution, parameters)
    }

    /// Run `query` in a transaction boundary, joining an active one
    pub fn execute(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        query: &RepositoryQuery,
        args: Vec<Argument>,
    ) -> Result<QueryResult<<F::Session as Session>::Row>, RepositoryError> {
        self.execute_with(ctx, TransactionDefinition::default(), query, args)
    }

    pub fn execute_with(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        definition: TransactionDefinition,
        query: &RepositoryQuery,
        args: Vec<Argument>,
    ) -> Result<QueryResult<<F::Session as Session>::Row>, RepositoryError> {
        self.manager.execute(ctx, definition, |ctx| {
            let session = ctx.require_session()?;
            query.execute(session, args)
        })
    }
}
