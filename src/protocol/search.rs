//! Table search requests.
//!
//! A search travels as a `misc("search", args)` call. Each argument is a
//! NUL-separated directive: `addcond`, `setorder`, `setlimit`, `get`, the
//! `out`/`count`/`hint` switches, and for metasearches a `next` marker ahead
//! of every extra branch plus a trailing `mstype`.
use std::fmt;

/// Condition operator codes understood by the server's predicate engine.
pub mod operator {
    pub const STR_EQ: u32 = 0;
    pub const STR_INC: u32 = 1;
    pub const STR_BW: u32 = 2;
    pub const STR_EW: u32 = 3;
    pub const STR_AND: u32 = 4;
    pub const STR_OR: u32 = 5;
    pub const STR_OREQ: u32 = 6;
    pub const STR_RX: u32 = 7;
    pub const NUM_EQ: u32 = 8;
    pub const NUM_GT: u32 = 9;
    pub const NUM_GE: u32 = 10;
    pub const NUM_LT: u32 = 11;
    pub const NUM_LE: u32 = 12;
    pub const NUM_BT: u32 = 13;
    pub const NUM_OREQ: u32 = 14;
    pub const FTS_PH: u32 = 15;
    pub const FTS_AND: u32 = 16;
    pub const FTS_OR: u32 = 17;
    pub const FTS_EX: u32 = 18;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    StrAsc = 0,
    StrDesc = 1,
    NumAsc = 2,
    NumDesc = 3,
}

impl OrderType {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// How metasearch branches are combined with the main condition set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperation {
    Union = 0,
    Intersect = 1,
    Difference = 2,
}

impl SetOperation {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOperation::Union => f.write_str("union"),
            SetOperation::Intersect => f.write_str("intersect"),
            SetOperation::Difference => f.write_str("difference"),
        }
    }
}

/// A condition ready for the wire: column, operator (with flag bits) and
/// the flattened expression text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreparedCondition {
    pub column: String,
    pub operator: u32,
    pub expression: String,
}

impl PreparedCondition {
    pub fn new(column: impl Into<String>, operator: u32, expression: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            expression: expression.into(),
        }
    }

    fn to_arg(&self) -> Vec<u8> {
        directive(&[
            "addcond",
            &self.column,
            &self.operator.to_string(),
            &self.expression,
        ])
    }
}

/// What the server returns for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Matching primary keys (or projected records when columns are requested).
    #[default]
    Keys,
    /// A single element holding the number of matches.
    Count,
    /// Matching keys followed by the planner's hint string.
    Hint,
    /// Removes every match.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub conditions: Vec<PreparedCondition>,
    pub order: Option<(String, OrderType)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub metasearch: Option<(SetOperation, Vec<Vec<PreparedCondition>>)>,
    pub columns: Vec<String>,
    pub mode: SearchMode,
}

impl SearchRequest {
    pub fn new(conditions: Vec<PreparedCondition>) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    pub fn order(mut self, column: impl Into<String>, order: OrderType) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn metasearch(
        mut self,
        operation: SetOperation,
        branches: Vec<Vec<PreparedCondition>>,
    ) -> Self {
        self.metasearch = Some((operation, branches));
        self
    }

    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Arguments for the `misc("search", ...)` call, in wire order.
    pub fn args(&self) -> Vec<Vec<u8>> {
        let mut args: Vec<Vec<u8>> = self.conditions.iter().map(|c| c.to_arg()).collect();

        if let Some((column, order)) = &self.order {
            args.push(directive(&["setorder", column, &order.code().to_string()]));
        }

        if self.limit.is_some() || self.offset.is_some() {
            let max = self
                .limit
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-1".to_string());
            let skip = self.offset.unwrap_or(0).to_string();
            args.push(directive(&["setlimit", &max, &skip]));
        }

        if !self.columns.is_empty() {
            let mut parts = vec!["get"];
            parts.extend(self.columns.iter().map(String::as_str));
            args.push(directive(&parts));
        }

        match self.mode {
            SearchMode::Keys => {}
            SearchMode::Count => args.push(b"count".to_vec()),
            SearchMode::Hint => args.push(b"hint".to_vec()),
            SearchMode::Delete => args.push(b"out".to_vec()),
        }

        if let Some((operation, branches)) = &self.metasearch {
            for branch in branches {
                args.push(b"next".to_vec());
                args.extend(branch.iter().map(|c| c.to_arg()));
            }
            args.push(directive(&["mstype", &operation.code().to_string()]));
        }

        args
    }
}

fn directive(parts: &[&str]) -> Vec<u8> {
    parts.join("\0").into_bytes()
}
