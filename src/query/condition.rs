//! Condition builder: predicate fragments plus bound values to a boolean tree.
//!
//! Values are consumed strictly left to right, part by part, following each
//! keyword's arity. Parts of one group are AND-folded from the left, groups
//! are OR-folded from the left, so AND always binds tighter than OR.

use crate::query::error::QueryError;
use crate::query::part::{Arity, IgnoreCase, Part, PartTree, PartType};
use crate::query::value_conversion::{value_to_pattern, value_to_sql_string};
use sea_query::Value;
use std::fmt;

/// The comparison a leaf performs against its property
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    IsNull,
    IsNotNull,
    /// An empty list is always false
    In(Vec<Value>),
    /// An empty list is always true
    NotIn(Vec<Value>),
    Like { pattern: String, ignore_case: bool },
    NotLike { pattern: String, ignore_case: bool },
    IsTrue,
    IsFalse,
}

impl Comparison {
    /// Values this comparison binds, in rendering order
    pub fn values(&self) -> Vec<Value> {
        match self {
            Comparison::Eq(v)
            | Comparison::Ne(v)
            | Comparison::Gt(v)
            | Comparison::Gte(v)
            | Comparison::Lt(v)
            | Comparison::Lte(v) => vec![v.clone()],
            Comparison::Between(a, b) => vec![a.clone(), b.clone()],
            Comparison::In(vs) | Comparison::NotIn(vs) => vs.clone(),
            Comparison::Like { pattern, .. } | Comparison::NotLike { pattern, .. } => {
                vec![Value::from(pattern.clone())]
            }
            Comparison::IsNull | Comparison::IsNotNull | Comparison::IsTrue | Comparison::IsFalse => {
                Vec::new()
            }
        }
    }

    /// `IN ()` / `NOT IN ()`: the result does not depend on the row
    pub fn is_vacuous(&self) -> bool {
        matches!(self, Comparison::In(vs) | Comparison::NotIn(vs) if vs.is_empty())
    }
}

/// A rendered predicate on one property
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub property: String,
    pub comparison: Comparison,
    pub negated: bool,
}

/// Binary boolean tree over predicates
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf(Predicate),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    /// Leaves from left to right
    pub fn leaves(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Condition::Leaf(p) => out.push(p),
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
        }
    }

    /// Bound values in leaf order
    pub fn values(&self) -> Vec<Value> {
        self.leaves()
            .into_iter()
            .flat_map(|p| p.comparison.values())
            .collect()
    }
}

/// Build the condition for `tree`, consuming `values` left to right.
///
/// Returns `Ok(None)` for a tree without parts (`findAll`, `countAll`).
///
/// # Errors
///
/// - `QueryError::UnsupportedOperator` for a keyword without a mapping
/// - `QueryError::ParameterArity` when a part needs more values than remain
/// - `QueryError::ParameterCount` when values are left over
pub fn build(tree: &PartTree, values: &[Value]) -> Result<Option<Condition>, QueryError> {
    let mut cursor = ValueCursor::new(values);
    let mut base: Option<Condition> = None;

    for group in tree.groups() {
        let mut criteria: Option<Condition> = None;
        for part in group {
            let leaf = to_condition(part, &mut cursor)?;
            criteria = Some(match criteria {
                Some(c) => c.and(leaf),
                None => leaf,
            });
        }
        if let Some(criteria) = criteria {
            base = Some(match base {
                Some(b) => b.or(criteria),
                None => criteria,
            });
        }
    }

    if cursor.remaining() > 0 {
        return Err(QueryError::ParameterCount {
            consumed: cursor.position,
            supplied: values.len(),
        });
    }

    Ok(base)
}

struct ValueCursor<'a> {
    values: &'a [Value],
    position: usize,
}

impl<'a> ValueCursor<'a> {
    fn new(values: &'a [Value]) -> Self {
        Self {
            values,
            position: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.values.len() - self.position
    }

    fn take(&mut self, part: &Part, n: usize) -> Result<&'a [Value], QueryError> {
        if self.remaining() < n {
            return Err(QueryError::ParameterArity {
                property: part.property().to_string(),
                required: n,
                remaining: self.remaining(),
            });
        }
        let taken = &self.values[self.position..self.position + n];
        self.position += n;
        Ok(taken)
    }

    fn take_rest(&mut self) -> &'a [Value] {
        let taken = &self.values[self.position..];
        self.position = self.values.len();
        taken
    }
}

fn to_condition(part: &Part, cursor: &mut ValueCursor<'_>) -> Result<Condition, QueryError> {
    let part_type = part.part_type();
    if !part_type.is_supported() {
        return Err(QueryError::UnsupportedOperator(part_type.to_string()));
    }

    let args: Vec<Value> = match part_type.arity() {
        Arity::Fixed(n) => cursor.take(part, n)?.to_vec(),
        Arity::Variable => cursor.take_rest().to_vec(),
    };
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::String(None));

    let comparison = match part_type {
        PartType::Equal => Comparison::Eq(arg(0)),
        PartType::NotEqual => Comparison::Ne(arg(0)),
        PartType::Greater | PartType::After => Comparison::Gt(arg(0)),
        PartType::GreaterOrEqual => Comparison::Gte(arg(0)),
        PartType::Less | PartType::Before => Comparison::Lt(arg(0)),
        PartType::LessOrEqual => Comparison::Lte(arg(0)),
        PartType::Between => Comparison::Between(arg(0), arg(1)),
        PartType::IsNull => Comparison::IsNull,
        PartType::IsNotNull => Comparison::IsNotNull,
        PartType::In => Comparison::In(args.clone()),
        PartType::NotIn => Comparison::NotIn(args.clone()),
        PartType::Like => Comparison::Like {
            pattern: pattern(part, &arg(0))?,
            ignore_case: ignores_case(part),
        },
        PartType::NotLike => Comparison::NotLike {
            pattern: pattern(part, &arg(0))?,
            ignore_case: ignores_case(part),
        },
        PartType::StartsWith => Comparison::Like {
            pattern: format!("{}%", escape_like(&pattern(part, &arg(0))?)),
            ignore_case: ignores_case(part),
        },
        PartType::EndsWith => Comparison::Like {
            pattern: format!("%{}", escape_like(&pattern(part, &arg(0))?)),
            ignore_case: ignores_case(part),
        },
        PartType::Contains => Comparison::Like {
            pattern: format!("%{}%", escape_like(&pattern(part, &arg(0))?)),
            ignore_case: ignores_case(part),
        },
        PartType::True => Comparison::IsTrue,
        PartType::False => Comparison::IsFalse,
        PartType::Near | PartType::Within | PartType::Regex | PartType::Exists => {
            return Err(QueryError::UnsupportedOperator(part_type.to_string()));
        }
    };

    Ok(Condition::Leaf(Predicate {
        property: part.property().to_string(),
        comparison,
        negated: part.is_negated(),
    }))
}

fn ignores_case(part: &Part) -> bool {
    matches!(
        part.ignore_case(),
        IgnoreCase::Always | IgnoreCase::WhenPossible
    )
}

fn pattern(part: &Part, value: &Value) -> Result<String, QueryError> {
    value_to_pattern(value).ok_or_else(|| {
        QueryError::InvalidArgument(format!(
            "'{}' expects a text value, got {value:?}",
            part.property()
        ))
    })
}

/// Escape LIKE metacharacters with the default backslash escape
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "NOT (")?;
        }
        let p = &self.property;
        match &self.comparison {
            Comparison::Eq(v) => write!(f, "{p} = {}", value_to_sql_string(v))?,
            Comparison::Ne(v) => write!(f, "{p} <> {}", value_to_sql_string(v))?,
            Comparison::Gt(v) => write!(f, "{p} > {}", value_to_sql_string(v))?,
            Comparison::Gte(v) => write!(f, "{p} >= {}", value_to_sql_string(v))?,
            Comparison::Lt(v) => write!(f, "{p} < {}", value_to_sql_string(v))?,
            Comparison::Lte(v) => write!(f, "{p} <= {}", value_to_sql_string(v))?,
            Comparison::Between(a, b) => write!(
                f,
                "{p} BETWEEN {} AND {}",
                value_to_sql_string(a),
                value_to_sql_string(b)
            )?,
            Comparison::IsNull => write!(f, "{p} IS NULL")?,
            Comparison::IsNotNull => write!(f, "{p} IS NOT NULL")?,
            Comparison::In(vs) if vs.is_empty() => write!(f, "1 = 2")?,
            Comparison::NotIn(vs) if vs.is_empty() => write!(f, "1 = 1")?,
            Comparison::In(vs) => write!(f, "{p} IN ({})", join_literals(vs))?,
            Comparison::NotIn(vs) => write!(f, "{p} NOT IN ({})", join_literals(vs))?,
            Comparison::Like {
                pattern,
                ignore_case,
            } => write_like(f, p, pattern, *ignore_case)?,
            Comparison::NotLike {
                pattern,
                ignore_case,
            } => {
                write!(f, "NOT (")?;
                write_like(f, p, pattern, *ignore_case)?;
                write!(f, ")")?;
            }
            Comparison::IsTrue => write!(f, "{p} = TRUE")?,
            Comparison::IsFalse => write!(f, "{p} = FALSE")?,
        }
        if self.negated {
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn write_like(f: &mut fmt::Formatter<'_>, property: &str, pattern: &str, ignore_case: bool) -> fmt::Result {
    let literal = value_to_sql_string(&Value::from(pattern.to_string()));
    if ignore_case {
        write!(f, "LOWER({property}) LIKE LOWER({literal})")
    } else {
        write!(f, "{property} LIKE {literal}")
    }
}

fn join_literals(values: &[Value]) -> String {
    values
        .iter()
        .map(value_to_sql_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Leaf(p) => write!(f, "{p}"),
            Condition::And(l, r) => write!(f, "{l} AND {r}"),
            Condition::Or(l, r) => {
                write_or_side(f, l)?;
                write!(f, " OR ")?;
                write_or_side(f, r)
            }
        }
    }
}

fn write_or_side(f: &mut fmt::Formatter<'_>, side: &Condition) -> fmt::Result {
    match side {
        Condition::And(..) => write!(f, "({side})"),
        _ => write!(f, "{side}"),
    }
}
