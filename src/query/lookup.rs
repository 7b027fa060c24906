//! The fixed table of named lookups.
//!
//! Every lookup name maps to an ordered list of [`Definition`]s. A condition
//! is compiled with the first definition whose shape accepts its expression,
//! so the order inside each list matters: `is` tries the numeric comparison
//! before falling back to string equality.
use crate::TyrantError;

use super::condition::{Expression, Scalar};
use crate::protocol::operator::*;

/// Lookup applied when a condition names a bare column.
pub const DEFAULT_LOOKUP: &str = "is";

/// Element type a definition accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    String,
    /// Integers, floats, booleans, or text that parses as an integer.
    Numeric,
    Boolean,
}

impl Kind {
    fn accepts(&self, scalar: &Scalar) -> bool {
        match self {
            Kind::Any => true,
            Kind::String => matches!(scalar, Scalar::Str(_)),
            Kind::Numeric => match scalar {
                Scalar::Int(_) | Scalar::Float(_) | Scalar::Bool(_) => true,
                Scalar::Str(s) => s.trim().parse::<i64>().is_ok(),
            },
            Kind::Boolean => matches!(scalar, Scalar::Bool(_)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub operator: u32,
    pub sequence: bool,
    pub kind: Kind,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// Lower-case every element before sending.
    pub fold_case: bool,
    /// Sent instead of the caller's value; a `false` value flips negation.
    pub canned: Option<&'static str>,
}

impl Definition {
    const fn scalar(operator: u32, kind: Kind) -> Self {
        Self {
            operator,
            sequence: false,
            kind,
            min_len: None,
            max_len: None,
            fold_case: false,
            canned: None,
        }
    }

    const fn sequence(operator: u32, kind: Kind) -> Self {
        Self {
            sequence: true,
            ..Self::scalar(operator, kind)
        }
    }

    const fn folded(self) -> Self {
        Self {
            fold_case: true,
            ..self
        }
    }

    const fn arity(self, min: usize, max: usize) -> Self {
        Self {
            min_len: Some(min),
            max_len: Some(max),
            ..self
        }
    }

    const fn canned(self, value: &'static str) -> Self {
        Self {
            canned: Some(value),
            ..self
        }
    }

    /// Whether the expression has the shape this definition expects. Empty
    /// sequences are accepted by every sequence definition; arity is checked
    /// separately by [`Definition::validate`].
    pub fn accepts(&self, expression: &Expression) -> bool {
        match (self.sequence, expression) {
            (false, Expression::Scalar(scalar)) => self.kind.accepts(scalar),
            (true, Expression::Sequence(items)) => {
                items.first().is_none_or(|first| self.kind.accepts(first))
            }
            _ => false,
        }
    }

    pub fn validate(&self, expression: &Expression) -> Result<(), TyrantError> {
        let Expression::Sequence(items) = expression else {
            return Ok(());
        };
        if let Some(min) = self.min_len.filter(|min| items.len() < *min) {
            return Err(TyrantError::Value(format!(
                "expected at least {min} arguments, got {}",
                items.len()
            )));
        }
        if let Some(max) = self.max_len.filter(|max| items.len() > *max) {
            return Err(TyrantError::Value(format!(
                "expected at most {max} arguments, got {}",
                items.len()
            )));
        }
        Ok(())
    }

    /// Flattens the expression into the text the predicate engine expects.
    /// Sequence elements are comma-joined.
    pub fn render(&self, expression: &Expression) -> String {
        if let Some(canned) = self.canned {
            return canned.to_string();
        }
        match expression {
            Expression::Scalar(scalar) => scalar.render(self.fold_case),
            Expression::Sequence(items) => items
                .iter()
                .map(|item| item.render(self.fold_case))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

const BETWEEN: &[Definition] = &[Definition::sequence(NUM_BT, Kind::Numeric).arity(2, 2)];
const CONTAINS: &[Definition] = &[
    Definition::scalar(STR_INC, Kind::String),
    Definition::sequence(STR_AND, Kind::String),
];
const CONTAINS_ANY: &[Definition] = &[Definition::sequence(STR_OR, Kind::String)];
const ENDSWITH: &[Definition] = &[Definition::scalar(STR_EW, Kind::String)];
const EXISTS: &[Definition] = &[Definition::scalar(STR_RX, Kind::Boolean).canned("")];
const GT: &[Definition] = &[Definition::scalar(NUM_GT, Kind::Numeric)];
const GTE: &[Definition] = &[Definition::scalar(NUM_GE, Kind::Numeric)];
const IN: &[Definition] = &[
    Definition::sequence(STR_OREQ, Kind::String),
    Definition::sequence(NUM_OREQ, Kind::Numeric),
];
const IS: &[Definition] = &[
    Definition::scalar(NUM_EQ, Kind::Numeric),
    Definition::scalar(STR_EQ, Kind::Any),
];
const LIKE: &[Definition] = &[
    Definition::scalar(FTS_PH, Kind::String).folded(),
    Definition::sequence(FTS_AND, Kind::String).folded(),
];
const LIKE_ANY: &[Definition] = &[Definition::sequence(FTS_OR, Kind::String).folded()];
const LT: &[Definition] = &[Definition::scalar(NUM_LT, Kind::Numeric)];
const LTE: &[Definition] = &[Definition::scalar(NUM_LE, Kind::Numeric)];
const MATCHES: &[Definition] = &[Definition::scalar(STR_RX, Kind::String)];
const SEARCH: &[Definition] = &[Definition::scalar(FTS_EX, Kind::String)];
const STARTSWITH: &[Definition] = &[Definition::scalar(STR_BW, Kind::String)];

/// Every lookup name, sorted.
pub const LOOKUPS: &[&str] = &[
    "between",
    "contains",
    "contains_any",
    "endswith",
    "exists",
    "gt",
    "gte",
    "in",
    "is",
    "like",
    "like_any",
    "lt",
    "lte",
    "matches",
    "search",
    "startswith",
];

/// Candidate definitions for `lookup`, in the order they are tried.
pub fn definitions(lookup: &str) -> Option<&'static [Definition]> {
    let definitions = match lookup {
        "between" => BETWEEN,
        "contains" => CONTAINS,
        "contains_any" => CONTAINS_ANY,
        "endswith" => ENDSWITH,
        "exists" => EXISTS,
        "gt" => GT,
        "gte" => GTE,
        "in" => IN,
        "is" => IS,
        "like" => LIKE,
        "like_any" => LIKE_ANY,
        "lt" => LT,
        "lte" => LTE,
        "matches" => MATCHES,
        "search" => SEARCH,
        "startswith" => STARTSWITH,
        _ => return None,
    };
    Some(definitions)
}

pub fn known_lookups() -> String {
    LOOKUPS.join(", ")
}

/// Picks the definition `lookup` uses for `expression`.
///
/// Fails with [`TyrantError::Lookup`] for an unknown name and with
/// [`TyrantError::Value`] when no definition fits the expression's shape.
pub fn resolve(lookup: &str, expression: &Expression) -> Result<&'static Definition, TyrantError> {
    let candidates = definitions(lookup).ok_or_else(|| TyrantError::Lookup {
        lookup: lookup.to_string(),
        known: known_lookups(),
    })?;

    candidates
        .iter()
        .find(|definition| definition.accepts(expression))
        .ok_or_else(|| {
            TyrantError::Value(format!(
                "no definition of lookup '{lookup}' accepts {expression}"
            ))
        })
}
