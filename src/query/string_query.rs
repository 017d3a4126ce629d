//! Queries declared with explicit SQL text instead of a derived name.
//!
//! The text is used as written; only a dynamic sort and pagination are
//! appended. Placeholders in the text are bound positionally.

use crate::query::error::QueryError;
use crate::query::execution::QueryCreator;
use crate::query::page::{Direction, Pageable, Sort};
use crate::query::render::RenderedQuery;
use sea_query::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringQuery {
    query: String,
    count: bool,
}

impl StringQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into().trim().trim_end_matches(';').to_string(),
            count: false,
        }
    }

    /// The text itself already returns a row count
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn is_count_query(&self) -> bool {
        self.count
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// `name` or `table.name`, made of ASCII letters, digits and underscores
fn is_sort_property(property: &str) -> bool {
    property.split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn apply_sorting(query: &mut String, sort: &Sort) -> Result<(), QueryError> {
    if sort.is_empty() {
        return Ok(());
    }
    let mut orders = Vec::with_capacity(sort.orders().len());
    for order in sort.orders() {
        if !is_sort_property(&order.property) {
            return Err(QueryError::InvalidArgument(format!(
                "sort property '{}' is not an identifier",
                order.property
            )));
        }
        let dir = match order.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        orders.push(format!("{} {dir}", order.property));
    }
    query.push_str(" ORDER BY ");
    query.push_str(&orders.join(", "));
    Ok(())
}

impl QueryCreator for StringQuery {
    fn create_query(
        &self,
        values: &[Value],
        pageable: Option<&Pageable>,
        sort: Option<&Sort>,
    ) -> Result<RenderedQuery, QueryError> {
        let mut sql = self.query.clone();
        let mut effective = Sort::default();
        if let Some(s) = pageable.and_then(Pageable::sort) {
            effective = effective.and_sort(s);
        }
        if let Some(s) = sort {
            effective = effective.and_sort(s);
        }
        apply_sorting(&mut sql, &effective)?;

        if let Some(p) = pageable {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", p.page_size(), p.offset()));
        }
        Ok(RenderedQuery {
            sql,
            values: values.to_vec(),
        })
    }

    fn create_count_query(&self, values: &[Value]) -> Result<RenderedQuery, QueryError> {
        let sql = if self.count {
            self.query.clone()
        } else {
            format!("SELECT COUNT(*) FROM ({}) AS count_query", self.query)
        };
        Ok(RenderedQuery {
            sql,
            values: values.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_untouched() {
        let q = StringQuery::new("SELECT * FROM person WHERE age > $1;");
        let rendered = q.create_query(&[Value::from(30)], None, None).unwrap();
        assert_eq!(rendered.sql, "SELECT * FROM person WHERE age > $1");
        assert_eq!(rendered.values, vec![Value::from(30)]);
    }

    #[test]
    fn test_sort_and_page_are_appended() {
        let q = StringQuery::new("SELECT * FROM person");
        let pageable = Pageable::of(1, 5).with_sort(Sort::by("lastName", Direction::Asc));
        let rendered = q
            .create_query(&[], Some(&pageable), Some(&Sort::by("age", Direction::Desc)))
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT * FROM person ORDER BY lastName ASC, age DESC LIMIT 5 OFFSET 5"
        );
    }

    #[test]
    fn test_qualified_sort_property_is_accepted() {
        let q = StringQuery::new("SELECT * FROM person p");
        let rendered = q
            .create_query(&[], None, Some(&Sort::by("p.last_name2", Direction::Desc)))
            .unwrap();
        assert_eq!(rendered.sql, "SELECT * FROM person p ORDER BY p.last_name2 DESC");
    }

    #[test]
    fn test_sort_property_with_sql_is_rejected() {
        let q = StringQuery::new("SELECT * FROM person");
        for property in ["id; DROP TABLE person; --", "1id", "a..b", "", "name DESC"] {
            let err = q
                .create_query(&[], None, Some(&Sort::by(property, Direction::Asc)))
                .unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidArgument(_)),
                "accepted '{property}'"
            );
        }

        let pageable = Pageable::of(0, 5).with_sort(Sort::by("x) UNION SELECT 1", Direction::Asc));
        assert!(q.create_query(&[], Some(&pageable), None).is_err());
    }

    #[test]
    fn test_count_query_wraps_text() {
        let q = StringQuery::new("SELECT * FROM person WHERE active");
        let rendered = q.create_count_query(&[]).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT COUNT(*) FROM (SELECT * FROM person WHERE active) AS count_query"
        );
    }

    #[test]
    fn test_count_flagged_text_is_its_own_count_query() {
        let q = StringQuery::new("SELECT COUNT(*) FROM person").count();
        assert!(q.is_count_query());
        assert_eq!(q.create_count_query(&[]).unwrap().sql, "SELECT COUNT(*) FROM person");
    }
}
