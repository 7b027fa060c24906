use crate::protocol::OrderType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortMethod {
    #[default]
    Lexicographic,
    Numeric,
}

/// Result ordering for a query.
///
/// An ordering without a column is the "unordered" sentinel. Two orderings
/// are equal when column, direction and method all match; a re-ordered query
/// keeps its predecessor's cached results only in that case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Ordering {
    column: Option<String>,
    direction: Direction,
    method: SortMethod,
}

impl Ordering {
    pub fn new(column: impl Into<String>, direction: Direction, method: SortMethod) -> Self {
        let column = column.into();
        Self {
            column: (!column.is_empty()).then_some(column),
            direction,
            method,
        }
    }

    /// `"name"` sorts ascending, `"-name"` descending, both lexicographically.
    pub fn parse(name: &str) -> Self {
        match name.strip_prefix('-') {
            Some(column) => Self::new(column, Direction::Descending, SortMethod::Lexicographic),
            None => Self::new(name, Direction::Ascending, SortMethod::Lexicographic),
        }
    }

    /// Same column and direction, compared as numbers.
    pub fn numeric(mut self) -> Self {
        self.method = SortMethod::Numeric;
        self
    }

    pub fn is_set(&self) -> bool {
        self.column.is_some()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn method(&self) -> SortMethod {
        self.method
    }

    pub fn order_type(&self) -> OrderType {
        match (self.direction, self.method) {
            (Direction::Ascending, SortMethod::Lexicographic) => OrderType::StrAsc,
            (Direction::Descending, SortMethod::Lexicographic) => OrderType::StrDesc,
            (Direction::Ascending, SortMethod::Numeric) => OrderType::NumAsc,
            (Direction::Descending, SortMethod::Numeric) => OrderType::NumDesc,
        }
    }
}

impl From<&str> for Ordering {
    fn from(name: &str) -> Self {
        Ordering::parse(name)
    }
}
