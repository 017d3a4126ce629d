//! Execution strategies for repository query methods.
//!
//! A [`QueryMethod`] is described once, when the repository is bound: its
//! result shape ([`QueryExecution`]) and the static position of its
//! pagination or sort argument ([`Parameters`]). Each call then reshapes the
//! raw arguments, asks a [`QueryCreator`] for SQL and runs it on a session.

use crate::error::RepositoryError;
use crate::query::error::QueryError;
use crate::query::page::{Page, Pageable, Sort};
use crate::query::render::RenderedQuery;
use crate::session::Session;
use sea_query::Value;

/// Result shape of a query method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryExecution {
    /// Every matching row
    Collection,
    /// At most one row; no row is not an error
    Single,
    /// Number of matching rows
    Count,
    /// One window of rows plus the total count
    Paged,
}

/// Static parameter layout of a query method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    count: usize,
    pageable_index: Option<usize>,
    sort_index: Option<usize>,
}

impl Parameters {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            pageable_index: None,
            sort_index: None,
        }
    }

    pub fn with_pageable(mut self, index: usize) -> Result<Self, QueryError> {
        self.check_index(index, "pageable")?;
        if self.sort_index.is_some() {
            return Err(QueryError::InvalidMethod(
                "a method takes either a pageable or a sort argument, not both".to_string(),
            ));
        }
        self.pageable_index = Some(index);
        Ok(self)
    }

    pub fn with_sort(mut self, index: usize) -> Result<Self, QueryError> {
        self.check_index(index, "sort")?;
        if self.pageable_index.is_some() {
            return Err(QueryError::InvalidMethod(
                "a method takes either a pageable or a sort argument, not both".to_string(),
            ));
        }
        self.sort_index = Some(index);
        Ok(self)
    }

    fn check_index(&self, index: usize, what: &str) -> Result<(), QueryError> {
        if index >= self.count {
            return Err(QueryError::InvalidMethod(format!(
                "{what} index {index} out of range for {} parameter(s)",
                self.count
            )));
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn pageable_index(&self) -> Option<usize> {
        self.pageable_index
    }

    pub fn sort_index(&self) -> Option<usize> {
        self.sort_index
    }

    /// Position of the argument that is not bound to the query; pagination wins
    pub fn synthetic_index(&self) -> Option<usize> {
        self.pageable_index.or(self.sort_index)
    }
}

/// Raw argument of a repository call
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Pageable(Pageable),
    Sort(Sort),
}

impl Argument {
    pub fn value(v: impl Into<Value>) -> Self {
        Argument::Value(v.into())
    }
}

impl From<Value> for Argument {
    fn from(v: Value) -> Self {
        Argument::Value(v)
    }
}

impl From<Pageable> for Argument {
    fn from(p: Pageable) -> Self {
        Argument::Pageable(p)
    }
}

impl From<Sort> for Argument {
    fn from(s: Sort) -> Self {
        Argument::Sort(s)
    }
}

/// Arguments split into bindable values and the synthetic directive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedArguments {
    pub values: Vec<Value>,
    pub pageable: Option<Pageable>,
    pub sort: Option<Sort>,
}

/// Remove the element at `index`, keeping the relative order of the rest.
///
/// Returns the removed element and the `len - 1` remaining ones, or `None`
/// when `index` is out of range.
pub fn strip_argument<T>(mut args: Vec<T>, index: usize) -> Option<(T, Vec<T>)> {
    if index >= args.len() {
        return None;
    }
    let removed = args.remove(index);
    Some((removed, args))
}

/// Binding-time description of a repository method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMethod {
    name: String,
    execution: QueryExecution,
    parameters: Parameters,
}

impl QueryMethod {
    /// # Errors
    ///
    /// `QueryError::InvalidMethod` for a paged method without a pageable parameter.
    pub fn new(
        name: impl Into<String>,
        execution: QueryExecution,
        parameters: Parameters,
    ) -> Result<Self, QueryError> {
        let name = name.into();
        if execution == QueryExecution::Paged && parameters.pageable_index().is_none() {
            return Err(QueryError::InvalidMethod(format!(
                "{name} returns a page but declares no pageable parameter"
            )));
        }
        Ok(Self {
            name,
            execution,
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution(&self) -> QueryExecution {
        self.execution
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Split raw call arguments per the parameter layout
    pub fn prepare_for_query(&self, args: Vec<Argument>) -> Result<PreparedArguments, QueryError> {
        if args.len() != self.parameters.count() {
            return Err(QueryError::InvalidArgument(format!(
                "{} expects {} argument(s), got {}",
                self.name,
                self.parameters.count(),
                args.len()
            )));
        }

        let mut prepared = PreparedArguments::default();
        let rest = match self.parameters.synthetic_index() {
            Some(index) => {
                let (synthetic, rest) = strip_argument(args, index).ok_or_else(|| {
                    QueryError::InvalidArgument(format!("no argument at index {index}"))
                })?;
                match synthetic {
                    Argument::Pageable(p) if self.parameters.pageable_index() == Some(index) => {
                        prepared.pageable = Some(p);
                    }
                    Argument::Sort(s) if self.parameters.sort_index() == Some(index) => {
                        prepared.sort = Some(s);
                    }
                    other => {
                        return Err(QueryError::InvalidArgument(format!(
                            "unexpected argument at index {index}: {other:?}"
                        )));
                    }
                }
                rest
            }
            None => args,
        };

        for arg in rest {
            match arg {
                Argument::Value(v) => prepared.values.push(v),
                other => {
                    return Err(QueryError::InvalidArgument(format!(
                        "{other:?} can only be passed at the declared position"
                    )));
                }
            }
        }
        Ok(prepared)
    }
}

/// Produces the SQL for one query method
pub trait QueryCreator {
    /// Content query for the given values and directives
    fn create_query(
        &self,
        values: &[Value],
        pageable: Option<&Pageable>,
        sort: Option<&Sort>,
    ) -> Result<RenderedQuery, QueryError>;

    /// Query returning the number of rows the content query would match
    fn create_count_query(&self, values: &[Value]) -> Result<RenderedQuery, QueryError>;
}

/// Shape-tagged query result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<R> {
    Collection(Vec<R>),
    Single(Option<R>),
    Count(u64),
    Page(Page<R>),
}

impl<R> QueryResult<R> {
    pub fn into_collection(self) -> Option<Vec<R>> {
        match self {
            QueryResult::Collection(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_single(self) -> Option<Option<R>> {
        match self {
            QueryResult::Single(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_page(self) -> Option<Page<R>> {
        match self {
            QueryResult::Page(page) => Some(page),
            _ => None,
        }
    }
}

/// Run `method` on `session`, shaping the result per its execution strategy
pub fn execute<S, C>(
    method: &QueryMethod,
    creator: &C,
    session: &S,
    args: Vec<Argument>,
) -> Result<QueryResult<S::Row>, RepositoryError>
where
    S: Session,
    C: QueryCreator + ?Sized,
{
    let PreparedArguments {
        values,
        pageable,
        sort,
    } = method.prepare_for_query(args)?;

    match method.execution() {
        QueryExecution::Collection => {
            let query = creator.create_query(&values, pageable.as_ref(), sort.as_ref())?;
            let rows = session.query_all(&query.sql, &query.values)?;
            Ok(QueryResult::Collection(rows))
        }
        QueryExecution::Single => {
            let query = creator.create_query(&values, pageable.as_ref(), sort.as_ref())?;
            let rows = session.query_all(&query.sql, &query.values)?;
            Ok(QueryResult::Single(rows.into_iter().next()))
        }
        QueryExecution::Count => {
            let query = creator.create_count_query(&values)?;
            Ok(QueryResult::Count(
                session.query_count(&query.sql, &query.values)?,
            ))
        }
        QueryExecution::Paged => {
            let pageable = pageable.ok_or_else(|| {
                QueryError::InvalidArgument(format!("{} requires a pageable", method.name()))
            })?;
            let count_query = creator.create_count_query(&values)?;
            let total = session.query_count(&count_query.sql, &count_query.values)?;
            if total <= pageable.offset() {
                log::debug!(
                    "{}: offset {} is past total {total}, skipping content query",
                    method.name(),
                    pageable.offset()
                );
                return Ok(QueryResult::Page(Page::empty(Some(pageable), total)));
            }
            let query = creator.create_query(&values, Some(&pageable), sort.as_ref())?;
            let rows = session.query_all(&query.sql, &query.values)?;
            Ok(QueryResult::Page(Page::new(rows, Some(pageable), total)))
        }
    }
}
