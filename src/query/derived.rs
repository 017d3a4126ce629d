//! Queries derived from a parsed method name.

use crate::query::condition;
use crate::query::error::QueryError;
use crate::query::execution::QueryCreator;
use crate::query::page::{Pageable, Sort};
use crate::query::part::PartTree;
use crate::query::render::{render, Projection, QueryDescriptor, QueryOptions, RenderedQuery};
use sea_query::Value;

/// A [`PartTree`] bound to a storage
#[derive(Debug, Clone, PartialEq)]
pub struct PartTreeQuery {
    tree: PartTree,
    storage: String,
    options: QueryOptions,
}

impl PartTreeQuery {
    pub fn new(tree: PartTree, storage: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            tree,
            storage: storage.into(),
            options,
        }
    }

    pub fn tree(&self) -> &PartTree {
        &self.tree
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    fn descriptor(&self, values: &[Value]) -> Result<QueryDescriptor, QueryError> {
        let condition = condition::build(&self.tree, values)?;
        Ok(QueryDescriptor::new(self.storage.clone())
            .condition(condition)
            .distinct(self.tree.is_distinct())
            .options(self.options.clone()))
    }
}

/// Static `OrderBy` sort first, then the pageable's sort, then a dynamic sort
fn effective_sort(tree: &PartTree, pageable: Option<&Pageable>, sort: Option<&Sort>) -> Sort {
    let mut effective = tree.sort().cloned().unwrap_or_default();
    if let Some(s) = pageable.and_then(Pageable::sort) {
        effective = effective.and_sort(s);
    }
    if let Some(s) = sort {
        effective = effective.and_sort(s);
    }
    effective
}

impl QueryCreator for PartTreeQuery {
    fn create_query(
        &self,
        values: &[Value],
        pageable: Option<&Pageable>,
        sort: Option<&Sort>,
    ) -> Result<RenderedQuery, QueryError> {
        let projection = if self.tree.is_count_projection() {
            Projection::Count
        } else {
            Projection::All
        };
        let descriptor = self
            .descriptor(values)?
            .projection(projection)
            .sort(effective_sort(&self.tree, pageable, sort))
            .paginate(pageable.cloned());
        Ok(render(&descriptor))
    }

    fn create_count_query(&self, values: &[Value]) -> Result<RenderedQuery, QueryError> {
        Ok(render(&self.descriptor(values)?.projection(Projection::Count)))
    }
}
