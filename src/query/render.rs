//! Query renderer: condition, ordering, pagination and projection to SQL.
//!
//! Rendering goes through a SeaQuery [`SelectStatement`]. Two value modes
//! exist: paged descriptors are rendered with every value inlined as a
//! literal, everything else with dialect placeholders plus a value list.

use crate::query::condition::{Comparison, Condition, Predicate};
use crate::query::page::{Direction, Pageable, Sort};
use sea_query::{
    Asterisk, Cond, Expr, ExprTrait, Func, Iden, LikeExpr, MysqlQueryBuilder, Order,
    PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder, Value,
};
use serde::Deserialize;

/// SQL dialect used for quoting and placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    Sqlite,
}

/// What the query selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Count,
}

/// Renderer options shared by every query of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub dialect: Dialect,
    /// Monotonic row identifier used for keyset continuation
    pub row_id_column: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            row_id_column: "id".to_string(),
        }
    }
}

/// Everything needed to render one query against one storage
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    storage: String,
    condition: Option<Condition>,
    sort: Sort,
    distinct: bool,
    projection: Projection,
    pagination: Option<Pageable>,
    options: QueryOptions,
}

impl QueryDescriptor {
    pub fn new(storage: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            condition: None,
            sort: Sort::default(),
            distinct: false,
            projection: Projection::All,
            pagination: None,
            options: QueryOptions::default(),
        }
    }

    pub fn condition(mut self, condition: Option<Condition>) -> Self {
        self.condition = condition;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn paginate(mut self, pageable: Option<Pageable>) -> Self {
        self.pagination = pageable;
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn pagination(&self) -> Option<&Pageable> {
        self.pagination.as_ref()
    }

    pub fn is_count(&self) -> bool {
        self.projection == Projection::Count
    }
}

/// Query text plus the values bound to its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Empty when values were inlined
    pub values: Vec<Value>,
}

/// Owned identifier, quoted by the dialect's builder
#[derive(Debug, Clone)]
struct Name(String);

impl Iden for Name {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

fn col(name: &str) -> Expr {
    Expr::col(Name(name.to_string()))
}

/// Render a descriptor to SQL
///
/// # Example
///
/// ```
/// use lifeline::query::{render, QueryDescriptor, Projection};
///
/// let rendered = render(&QueryDescriptor::new("person").projection(Projection::Count));
/// assert_eq!(rendered.sql, r#"SELECT COUNT(*) FROM "person""#);
/// assert!(rendered.values.is_empty());
/// ```
pub fn render(descriptor: &QueryDescriptor) -> RenderedQuery {
    let options = &descriptor.options;
    let count = descriptor.is_count();
    let escape = options.dialect == Dialect::Sqlite;
    let mut filter = descriptor
        .condition
        .as_ref()
        .map(|c| to_sea_condition(c, escape));

    let mut select = SelectStatement::default();
    if count && descriptor.distinct {
        // count the distinct rows, not the matching ones
        let mut rows = SelectStatement::default();
        rows.column(Asterisk)
            .distinct()
            .from(Name(descriptor.storage.clone()));
        if let Some(filter) = filter.take() {
            rows.cond_where(filter);
        }
        select
            .expr(Expr::cust("COUNT(*)"))
            .from_subquery(rows, Name("count_query".to_string()));
    } else if count {
        select
            .expr(Expr::cust("COUNT(*)"))
            .from(Name(descriptor.storage.clone()));
    } else {
        select.column(Asterisk);
        if descriptor.distinct {
            select.distinct();
        }
        select.from(Name(descriptor.storage.clone()));
    }

    if !count {
        if !descriptor.sort.is_empty() {
            apply_sort(&mut select, &descriptor.sort);
        } else if let Some(pageable) = &descriptor.pagination {
            let continuation = col(&options.row_id_column).gt(pageable.offset());
            filter = Some(match (filter, &descriptor.condition) {
                // OR root: keep the groups together, continuation outside
                (Some(existing), Some(Condition::Or(..))) => {
                    Cond::all().add(existing).add(continuation)
                }
                // AND chain or single leaf: already a flat Condition::all
                (Some(existing), _) => existing.add(continuation),
                (None, _) => Cond::all().add(continuation),
            });
        }
    }

    if let Some(filter) = filter {
        select.cond_where(filter);
    }

    let inline = descriptor.pagination.is_some();
    if let (false, Some(pageable)) = (count, &descriptor.pagination) {
        select.limit(pageable.page_size());
        if !descriptor.sort.is_empty() {
            select.offset(pageable.offset());
        }
    }

    let rendered = match (options.dialect, inline) {
        (Dialect::Postgres, true) => inline_query(select.to_string(PostgresQueryBuilder)),
        (Dialect::MySql, true) => inline_query(select.to_string(MysqlQueryBuilder)),
        (Dialect::Sqlite, true) => inline_query(select.to_string(SqliteQueryBuilder)),
        (Dialect::Postgres, false) => bound_query(select.build(PostgresQueryBuilder)),
        (Dialect::MySql, false) => bound_query(select.build(MysqlQueryBuilder)),
        (Dialect::Sqlite, false) => bound_query(select.build(SqliteQueryBuilder)),
    };
    log::debug!("Rendered query on {}: {}", descriptor.storage, rendered.sql);
    rendered
}

fn inline_query(sql: String) -> RenderedQuery {
    RenderedQuery {
        sql,
        values: Vec::new(),
    }
}

fn bound_query((sql, values): (String, sea_query::Values)) -> RenderedQuery {
    RenderedQuery {
        sql,
        values: values.0,
    }
}

fn apply_sort(select: &mut SelectStatement, sort: &Sort) {
    for order in sort.orders() {
        let direction = match order.direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        select.order_by(Name(order.property.clone()), direction);
    }
}

/// Convert a condition tree to a SeaQuery condition.
///
/// AND chains and OR chains are flattened into one `Condition::all` /
/// `Condition::any` each; nested conditions are parenthesised by the builder.
fn to_sea_condition(condition: &Condition, escape: bool) -> Cond {
    match condition {
        Condition::Leaf(p) => Cond::all().add(predicate_expr(p, escape)),
        Condition::And(..) => {
            let mut all = Cond::all();
            for child in chain(condition, true) {
                all = add_child(all, child, escape);
            }
            all
        }
        Condition::Or(..) => {
            let mut any = Cond::any();
            for child in chain(condition, false) {
                any = add_child(any, child, escape);
            }
            any
        }
    }
}

fn add_child(parent: Cond, child: &Condition, escape: bool) -> Cond {
    match child {
        Condition::Leaf(p) => parent.add(predicate_expr(p, escape)),
        nested => parent.add(to_sea_condition(nested, escape)),
    }
}

/// Operands of a same-operator chain, left to right
fn chain(condition: &Condition, and: bool) -> Vec<&Condition> {
    match (condition, and) {
        (Condition::And(l, r), true) | (Condition::Or(l, r), false) => {
            let mut out = chain(l, and);
            out.extend(chain(r, and));
            out
        }
        _ => vec![condition],
    }
}

fn like_expr(pattern: &str, ignore_case: bool, escape: bool) -> LikeExpr {
    let pattern = if ignore_case {
        pattern.to_lowercase()
    } else {
        pattern.to_string()
    };
    let like = LikeExpr::new(pattern);
    if escape {
        like.escape('\\')
    } else {
        like
    }
}

fn like_target(property: &str, ignore_case: bool) -> Expr {
    if ignore_case {
        Expr::expr(Func::lower(col(property)))
    } else {
        col(property)
    }
}

fn predicate_expr(predicate: &Predicate, escape: bool) -> Expr {
    let p = predicate.property.as_str();
    let expr = match &predicate.comparison {
        Comparison::Eq(v) => col(p).eq(v.clone()),
        Comparison::Ne(v) => col(p).ne(v.clone()),
        Comparison::Gt(v) => col(p).gt(v.clone()),
        Comparison::Gte(v) => col(p).gte(v.clone()),
        Comparison::Lt(v) => col(p).lt(v.clone()),
        Comparison::Lte(v) => col(p).lte(v.clone()),
        Comparison::Between(a, b) => col(p).between(a.clone(), b.clone()),
        Comparison::IsNull => col(p).is_null(),
        Comparison::IsNotNull => col(p).is_not_null(),
        Comparison::In(vs) if vs.is_empty() => Expr::cust("1 = 2"),
        Comparison::NotIn(vs) if vs.is_empty() => Expr::cust("1 = 1"),
        Comparison::In(vs) => col(p).is_in(vs.iter().cloned()),
        Comparison::NotIn(vs) => col(p).is_not_in(vs.iter().cloned()),
        Comparison::Like {
            pattern,
            ignore_case,
        } => like_target(p, *ignore_case).like(like_expr(pattern, *ignore_case, escape)),
        Comparison::NotLike {
            pattern,
            ignore_case,
        } => like_target(p, *ignore_case)
            .like(like_expr(pattern, *ignore_case, escape))
            .not(),
        Comparison::IsTrue => col(p).eq(Expr::cust("TRUE")),
        Comparison::IsFalse => col(p).eq(Expr::cust("FALSE")),
    };
    if predicate.negated {
        expr.not()
    } else {
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::build;
    use crate::query::part::{Part, PartTree, PartType};

    fn person() -> QueryDescriptor {
        QueryDescriptor::new("person")
    }

    fn condition(tree: PartTree, values: &[Value]) -> Option<Condition> {
        build(&tree, values).unwrap()
    }

    #[test]
    fn test_equal_uses_placeholders() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]),
            &[Value::from("Naskou")],
        );
        let rendered = render(&person().condition(cond));
        assert_eq!(rendered.sql, r#"SELECT * FROM "person" WHERE "lastName" = $1"#);
        assert_eq!(rendered.values, vec![Value::from("Naskou")]);
    }

    #[test]
    fn test_mysql_placeholders() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]),
            &[Value::from("Naskou")],
        );
        let options = QueryOptions {
            dialect: Dialect::MySql,
            ..QueryOptions::default()
        };
        let rendered = render(&person().condition(cond).options(options));
        assert_eq!(rendered.sql, "SELECT * FROM `person` WHERE `lastName` = ?");
    }

    #[test]
    fn test_count_ignores_pagination() {
        let rendered = render(
            &person()
                .projection(Projection::Count)
                .paginate(Some(Pageable::of(2, 10))),
        );
        assert_eq!(rendered.sql, r#"SELECT COUNT(*) FROM "person""#);
        assert!(rendered.values.is_empty());
    }

    #[test]
    fn test_paged_without_sort_uses_row_id_continuation() {
        let rendered = render(&person().paginate(Some(Pageable::of(2, 10))));
        assert_eq!(
            rendered.sql,
            r#"SELECT * FROM "person" WHERE "id" > 20 LIMIT 10"#
        );
        assert!(!rendered.sql.contains("OFFSET"));
        assert!(!rendered.sql.contains("ORDER BY"));
    }

    #[test]
    fn test_paged_with_sort_uses_offset() {
        let rendered = render(
            &person()
                .sort(Sort::by("firstName", Direction::Asc))
                .paginate(Some(Pageable::of(2, 10))),
        );
        assert_eq!(
            rendered.sql,
            r#"SELECT * FROM "person" ORDER BY "firstName" ASC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn test_paged_values_are_inlined() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]),
            &[Value::from("Naskou")],
        );
        let rendered = render(&person().condition(cond).paginate(Some(Pageable::of(0, 5))));
        assert!(rendered.sql.contains("'Naskou'"));
        assert!(rendered.sql.contains(r#""id" > 0"#));
        assert!(rendered.values.is_empty());
    }

    #[test]
    fn test_continuation_is_anded_outside_or_groups() {
        let cond = condition(
            PartTree::new()
                .or_group(vec![Part::new("a", PartType::Equal)])
                .or_group(vec![Part::new("b", PartType::Equal)]),
            &[Value::Int(Some(1)), Value::Int(Some(2))],
        );
        let rendered = render(&person().condition(cond).paginate(Some(Pageable::of(1, 3))));
        assert!(
            rendered.sql.contains(r#"("a" = 1 OR "b" = 2) AND "id" > 3"#),
            "unexpected SQL: {}",
            rendered.sql
        );
    }

    #[test]
    fn test_sort_order_is_preserved() {
        let rendered = render(
            &person().sort(Sort::by("lastName", Direction::Desc).and("firstName", Direction::Asc)),
        );
        assert_eq!(
            rendered.sql,
            r#"SELECT * FROM "person" ORDER BY "lastName" DESC, "firstName" ASC"#
        );
    }

    #[test]
    fn test_distinct_projection() {
        let rendered = render(&person().distinct(true));
        assert_eq!(rendered.sql, r#"SELECT DISTINCT * FROM "person""#);
    }

    #[test]
    fn test_distinct_count_counts_distinct_rows() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("lastName", PartType::Equal)]),
            &[Value::from("Naskou")],
        );
        let rendered = render(
            &person()
                .condition(cond)
                .distinct(true)
                .projection(Projection::Count),
        );
        assert_eq!(
            rendered.sql,
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT * FROM "person" WHERE "lastName" = $1) AS "count_query""#
        );
        assert_eq!(rendered.values, vec![Value::from("Naskou")]);
    }

    #[test]
    fn test_or_groups_are_parenthesised() {
        let cond = condition(
            PartTree::new()
                .or_group(vec![
                    Part::new("a", PartType::Equal),
                    Part::new("b", PartType::Equal),
                ])
                .or_group(vec![Part::new("c", PartType::IsNull)]),
            &[Value::Int(Some(1)), Value::Int(Some(2))],
        );
        let rendered = render(&person().condition(cond));
        assert!(
            rendered.sql.contains(r#"("a" = $1 AND "b" = $2) OR "c" IS NULL"#),
            "unexpected SQL: {}",
            rendered.sql
        );
        assert_eq!(rendered.values, vec![Value::Int(Some(1)), Value::Int(Some(2))]);
    }

    #[test]
    fn test_vacuous_in_renders_constant() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("id", PartType::In)]),
            &[],
        );
        let rendered = render(&person().condition(cond));
        assert_eq!(rendered.sql, r#"SELECT * FROM "person" WHERE 1 = 2"#);
        assert!(rendered.values.is_empty());
    }

    #[test]
    fn test_ignore_case_like_lowers_both_sides() {
        let cond = condition(
            PartTree::new().or_group(vec![
                Part::new("name", PartType::Like).ignoring_case(crate::query::part::IgnoreCase::Always),
            ]),
            &[Value::from("Dz%")],
        );
        let rendered = render(&person().condition(cond));
        assert!(rendered.sql.to_uppercase().contains(r#"LOWER("NAME") LIKE $1"#));
        assert_eq!(rendered.values, vec![Value::from("dz%")]);
    }

    #[test]
    fn test_ignore_case_wildcard_keywords_lower_both_sides() {
        for (part_type, expected) in [
            (PartType::StartsWith, "dz%"),
            (PartType::EndsWith, "%dz"),
            (PartType::Contains, "%dz%"),
        ] {
            let cond = condition(
                PartTree::new().or_group(vec![Part::new("firstName", part_type)
                    .ignoring_case(crate::query::part::IgnoreCase::Always)]),
                &[Value::from("Dz")],
            );
            let rendered = render(&person().condition(cond));
            assert!(
                rendered.sql.to_uppercase().contains(r#"LOWER("FIRSTNAME") LIKE $1"#),
                "unexpected SQL for {part_type:?}: {}",
                rendered.sql
            );
            assert_eq!(rendered.values, vec![Value::from(expected)]);
        }
    }

    #[test]
    fn test_not_like_negates_predicate() {
        let cond = condition(
            PartTree::new().or_group(vec![Part::new("name", PartType::NotLike)]),
            &[Value::from("Dz%")],
        );
        let rendered = render(&person().condition(cond));
        assert!(rendered.sql.contains("NOT"), "unexpected SQL: {}", rendered.sql);
        assert!(rendered.sql.contains("LIKE"));
    }
}
