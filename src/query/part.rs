//! Predicate fragments produced by a repository method parser.
//!
//! A method such as `findByLastNameAndFirstNameStartingWithOrAgeGreaterThan`
//! is described by a [`PartTree`]: an ordered list of OR-groups, each group an
//! ordered list of AND-combined [`Part`]s. Parsing the method name itself is
//! the caller's concern; this module only models the result.

use crate::query::page::Sort;
use std::fmt;

/// Number of bound values a predicate consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many values
    Fixed(usize),
    /// Every remaining value
    Variable,
}

/// Predicate keyword attached to a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    /// Alias of `Greater` for temporal properties
    After,
    /// Alias of `Less` for temporal properties
    Before,
    Between,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Like,
    NotLike,
    StartsWith,
    EndsWith,
    Contains,
    True,
    False,
    Near,
    Within,
    Regex,
    Exists,
}

impl PartType {
    /// Parameter arity of the keyword
    pub fn arity(self) -> Arity {
        match self {
            PartType::IsNull
            | PartType::IsNotNull
            | PartType::True
            | PartType::False
            | PartType::Exists => Arity::Fixed(0),
            PartType::Between | PartType::Near | PartType::Within => Arity::Fixed(2),
            PartType::In | PartType::NotIn => Arity::Variable,
            _ => Arity::Fixed(1),
        }
    }

    /// Whether the condition builder has a mapping for this keyword
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            PartType::Near | PartType::Within | PartType::Regex | PartType::Exists
        )
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Case sensitivity requested for a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgnoreCase {
    #[default]
    Never,
    Always,
    WhenPossible,
}

/// One atomic comparison derived from a method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    property: String,
    part_type: PartType,
    ignore_case: IgnoreCase,
    negated: bool,
}

impl Part {
    pub fn new(property: impl Into<String>, part_type: PartType) -> Self {
        Self {
            property: property.into(),
            part_type,
            ignore_case: IgnoreCase::Never,
            negated: false,
        }
    }

    pub fn ignoring_case(mut self, ignore_case: IgnoreCase) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Dotted property path, e.g. `address.city`
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn part_type(&self) -> PartType {
        self.part_type
    }

    pub fn ignore_case(&self) -> IgnoreCase {
        self.ignore_case
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

/// Parsed shape of a derived repository method
///
/// # Example
///
/// ```
/// use lifeline::query::{Part, PartTree, PartType};
///
/// // findByLastNameAndFirstNameStartingWith
/// let tree = PartTree::new()
///     .or_group(vec![
///         Part::new("lastName", PartType::Equal),
///         Part::new("firstName", PartType::StartsWith),
///     ]);
/// assert_eq!(tree.parts().count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartTree {
    groups: Vec<Vec<Part>>,
    distinct: bool,
    count_projection: bool,
    sort: Option<Sort>,
}

impl PartTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an AND-group, OR-ed with the groups before it
    pub fn or_group(mut self, parts: Vec<Part>) -> Self {
        if !parts.is_empty() {
            self.groups.push(parts);
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Mark the method as `countBy…`
    pub fn count(mut self) -> Self {
        self.count_projection = true;
        self
    }

    /// Static ordering from an `…OrderBy…` suffix
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn groups(&self) -> &[Vec<Part>] {
        &self.groups
    }

    /// All parts in declaration order
    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.groups.iter().flatten()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn is_count_projection(&self) -> bool {
        self.count_projection
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }
}
