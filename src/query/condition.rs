use std::fmt;

use log::trace;

use crate::{
    TyrantError,
    protocol::{ConditionFlags, PreparedCondition},
};

use super::lookup::{self, DEFAULT_LOOKUP};

/// Separates the column from the lookup in `column__lookup`.
const LOOKUP_SEPARATOR: &str = "__";

/// One element of a condition's expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    /// Reads a scalar typed on a command line: `true`/`false`, then integers,
    /// then floats, anything else is text.
    pub fn infer(text: &str) -> Self {
        match text {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => {
                if let Ok(int) = text.parse() {
                    Scalar::Int(int)
                } else if let Ok(float) = text.parse() {
                    Scalar::Float(float)
                } else {
                    Scalar::Str(text.to_string())
                }
            }
        }
    }

    /// Protocol-safe text: booleans become `"1"` or the empty string.
    pub(crate) fn render(&self, fold_case: bool) -> String {
        match self {
            Scalar::Str(s) if fold_case => s.to_lowercase(),
            Scalar::Str(s) => s.clone(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => String::new(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{s:?}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident($conv:expr)),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant($conv(value))
                }
            }

            impl From<$ty> for Expression {
                fn from(value: $ty) -> Self {
                    Expression::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

scalar_from! {
    &str => Str(str::to_string),
    String => Str(std::convert::identity),
    i64 => Int(std::convert::identity),
    i32 => Int(i64::from),
    u32 => Int(i64::from),
    f64 => Float(std::convert::identity),
    bool => Bool(std::convert::identity),
}

/// The value side of a condition: one scalar, or a list of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
}

impl From<Scalar> for Expression {
    fn from(value: Scalar) -> Self {
        Expression::Scalar(value)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for Expression {
    fn from(values: Vec<T>) -> Self {
        Expression::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar>, const N: usize> From<[T; N]> for Expression {
    fn from(values: [T; N]) -> Self {
        Expression::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Scalar(scalar) => write!(f, "{scalar}"),
            Expression::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A single column test, compiled lazily by [`Condition::prepare`].
///
/// The lookup name is only checked when the condition is prepared, which
/// always happens before the search that carries it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    lookup: String,
    expression: Expression,
    flags: ConditionFlags,
}

impl Condition {
    /// `lookup` is either a bare column (`"name"`) or `"column__lookup"`.
    pub fn new(lookup: &str, expression: impl Into<Expression>) -> Self {
        let (column, lookup) = lookup
            .split_once(LOOKUP_SEPARATOR)
            .unwrap_or((lookup, DEFAULT_LOOKUP));
        Self {
            column: column.to_string(),
            lookup: lookup.to_string(),
            expression: expression.into(),
            flags: ConditionFlags::empty(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn lookup(&self) -> &str {
        &self.lookup
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn flags(&self) -> ConditionFlags {
        self.flags
    }

    pub fn is_negated(&self) -> bool {
        self.flags.contains(ConditionFlags::NEGATE)
    }

    /// Flips negation; negating twice restores the original test.
    pub fn negated(mut self) -> Self {
        self.flags.toggle(ConditionFlags::NEGATE);
        self
    }

    /// Asks the server not to use a column index for this test.
    pub fn without_index(mut self) -> Self {
        self.flags.insert(ConditionFlags::NO_INDEX);
        self
    }

    pub fn prepare(&self) -> Result<PreparedCondition, TyrantError> {
        let definition = lookup::resolve(&self.lookup, &self.expression)?;
        definition.validate(&self.expression).map_err(|e| match e {
            TyrantError::Value(reason) => TyrantError::Value(format!(
                "bad lookup {}__{}={}: {reason}",
                self.column, self.lookup, self.expression
            )),
            e => e,
        })?;

        let mut flags = self.flags;
        if definition.canned.is_some() && self.expression == Expression::from(false) {
            flags.toggle(ConditionFlags::NEGATE);
        }

        let prepared = PreparedCondition::new(
            self.column.clone(),
            definition.operator | flags.bits(),
            definition.render(&self.expression),
        );
        trace!("prepared {self:?} as {prepared:?}");
        Ok(prepared)
    }
}
