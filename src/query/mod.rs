//! Query derivation, rendering and execution.
//!
//! # Architecture
//!
//! - **Part**: predicate fragments and the parsed method shape (`Part`, `PartTree`)
//! - **Condition**: fragments plus bound values to a boolean tree (`build`)
//! - **Render**: condition, sort, pagination and projection to SQL (`render`)
//! - **Execution**: per-method result shape and argument reshaping (`execute`)
//! - **Derived / String query**: the two sources of SQL for a repository method
//! - **Value Conversion**: SeaQuery `Value` to `ToSql` parameters and literals
//!
//! # Examples
//!
//! ```
//! use lifeline::query::{build, render, Part, PartTree, PartType, QueryDescriptor};
//! use lifeline::Value;
//!
//! let tree = PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]);
//! let condition = build(&tree, &[Value::from("Naskou")])?;
//! let rendered = render(&QueryDescriptor::new("person").condition(condition));
//!
//! assert_eq!(rendered.sql, r#"SELECT * FROM "person" WHERE "lastName" = $1"#);
//! # Ok::<(), lifeline::query::QueryError>(())
//! ```

pub mod condition;
pub mod derived;
pub mod error;
pub mod execution;
pub mod page;
pub mod part;
pub mod render;
pub mod string_query;

// Value conversion utilities
pub(crate) mod value_conversion;

#[doc(inline)]
pub use condition::{build, Comparison, Condition, Predicate};
pub use derived::PartTreeQuery;
pub use error::QueryError;
pub use execution::{
    execute, strip_argument, Argument, Parameters, PreparedArguments, QueryCreator,
    QueryExecution, QueryMethod, QueryResult,
};
pub use page::{Direction, Page, Pageable, Sort, SortOrder};
pub use part::{Arity, IgnoreCase, Part, PartTree, PartType};
pub use render::{render, Dialect, Projection, QueryDescriptor, QueryOptions, RenderedQuery};
pub use string_query::StringQuery;
