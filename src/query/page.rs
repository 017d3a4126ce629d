//! Sorting and pagination requests, and the page they produce.

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One `(property, direction)` pair of a [`Sort`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

/// Ordered list of sort orders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<SortOrder>,
}

impl Sort {
    pub fn by(property: impl Into<String>, direction: Direction) -> Self {
        Self::default().and(property, direction)
    }

    pub fn and(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(SortOrder {
            property: property.into(),
            direction,
        });
        self
    }

    /// Append every order of `other` after the orders of `self`
    pub fn and_sort(mut self, other: &Sort) -> Self {
        self.orders.extend(other.orders.iter().cloned());
        self
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Pagination request: zero-based page number and page size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    page: u64,
    size: u64,
    sort: Option<Sort>,
}

impl Pageable {
    pub fn of(page: u64, size: u64) -> Self {
        Self {
            page,
            size,
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = if sort.is_empty() { None } else { Some(sort) };
        self
    }

    pub fn page_number(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.size
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }
}

/// One window of a paged query together with the total row count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    pageable: Option<Pageable>,
    total: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: Option<Pageable>, total: u64) -> Self {
        Self {
            content,
            pageable,
            total,
        }
    }

    /// A page with no content, used when the offset is past the last row
    pub fn empty(pageable: Option<Pageable>, total: u64) -> Self {
        Self::new(Vec::new(), pageable, total)
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn pageable(&self) -> Option<&Pageable> {
        self.pageable.as_ref()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn total_pages(&self) -> u64 {
        match &self.pageable {
            Some(p) if p.page_size() > 0 => self.total.div_ceil(p.page_size()),
            _ => 1,
        }
    }

    pub fn has_next(&self) -> bool {
        match &self.pageable {
            Some(p) => p.page_number() + 1 < self.total_pages(),
            None => false,
        }
    }

    /// Convert the content, e.g. from rows to models
    pub fn map<U, E, F>(self, f: F) -> Result<Page<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let content = self.content.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page::new(content, self.pageable, self.total))
    }
}
