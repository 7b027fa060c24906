//! Shell commands for the interactive client.
//!
//! This module defines the [`Command`] enum, one variant per line a user can
//! type into `tyrant_cli`, and the parser that turns a line into a command.
//! Execution lives in [`cli`](crate::cli).
//!
//! # Overview
//!
//! - `get <key>`, `out <key>`: read or remove one record.
//! - `put <key> <value>`: store text, or a table record when every value token
//!   is `column=value`.
//! - `stat`, `rnum`, `vanish`, `sync`: database wide operations.
//! - `keys [prefix]`: list keys, optionally only those with a prefix.
//! - `search <term>... [count]`: run a table query. A term is
//!   `column[__lookup]=expr`, `!column[__lookup]=expr` to exclude, or
//!   `order=[-]column[:num]`. Comma separated expressions become sequences.
//! - `.exit`: close the session.
//!
//! # Example
//! ```rust
//! use tyrant::Command;
//!
//! let cmd: Command = "rnum".try_into().unwrap();
//! assert_eq!(cmd, Command::Rnum);
//! ```
use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    codec::Value,
    query::{Condition, Expression, Ordering, Scalar},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("invalid search term '{term}', {reason}")]
    InvalidSearchTerm { term: String, reason: String },

    #[error("failed to read input: {0}")]
    Input(String),

    #[error("no command provided")]
    Empty,
}

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Get(String),
    Put { key: String, value: Value },
    Out(String),
    Stat,
    Rnum,
    Keys(Option<String>),
    Vanish,
    Sync,
    Search {
        conditions: Vec<Condition>,
        ordering: Option<Ordering>,
        count: bool,
    },
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(CommandError::Empty);
        };
        let args: Vec<&str> = parts.collect();

        match (name, args.as_slice()) {
            (".exit", []) => Ok(Command::Exit),
            ("get", [key]) => Ok(Command::Get(key.to_string())),
            ("out", [key]) => Ok(Command::Out(key.to_string())),
            ("put", [key, value @ ..]) if !value.is_empty() => Ok(Command::Put {
                key: key.to_string(),
                value: parse_value(value),
            }),
            ("stat", []) => Ok(Command::Stat),
            ("rnum", []) => Ok(Command::Rnum),
            ("keys", []) => Ok(Command::Keys(None)),
            ("keys", [prefix]) => Ok(Command::Keys(Some(prefix.to_string()))),
            ("vanish", []) => Ok(Command::Vanish),
            ("sync", []) => Ok(Command::Sync),
            ("search", terms) => parse_search(terms),
            ("get" | "out", _) => {
                Err(arguments(name, "requires exactly one key. Example: get foo"))
            }
            ("put", _) => Err(arguments(name, "requires a key and a value. Example: put foo bar")),
            ("keys", _) => Err(arguments(name, "takes at most one prefix. Example: keys user:")),
            (".exit" | "stat" | "rnum" | "vanish" | "sync", _) => {
                Err(arguments(name, "takes no arguments"))
            }
            _ => Err(CommandError::UnrecognizedCommand(name.to_string())),
        }
    }
}

fn arguments(command: &str, reason: &str) -> CommandError {
    CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value(tokens: &[&str]) -> Value {
    let columns: Option<BTreeMap<String, String>> = tokens
        .iter()
        .map(|token| {
            token
                .split_once('=')
                .filter(|(column, _)| !column.is_empty())
                .map(|(column, value)| (column.to_string(), value.to_string()))
        })
        .collect();

    match columns {
        Some(columns) => Value::Table(columns),
        None => Value::from(tokens.join(" ")),
    }
}

fn parse_search(terms: &[&str]) -> Result<Command, CommandError> {
    let mut conditions = Vec::new();
    let mut ordering = None;
    let mut count = false;

    for term in terms {
        if *term == "count" {
            count = true;
            continue;
        }
        let invalid = |reason: &str| CommandError::InvalidSearchTerm {
            term: term.to_string(),
            reason: reason.to_string(),
        };

        let (lhs, rhs) = term
            .split_once('=')
            .ok_or_else(|| invalid("expected column=expression"))?;

        if lhs == "order" {
            let (column, numeric) = match rhs.strip_suffix(":num") {
                Some(column) => (column, true),
                None => (rhs, false),
            };
            let parsed = Ordering::parse(column);
            if !parsed.is_set() {
                return Err(invalid("order needs a column name"));
            }
            ordering = Some(if numeric { parsed.numeric() } else { parsed });
            continue;
        }

        let (lookup, negate) = match lhs.strip_prefix('!') {
            Some(lookup) => (lookup, true),
            None => (lhs, false),
        };
        if lookup.is_empty() || lookup.starts_with("__") {
            return Err(invalid("missing column name"));
        }

        let condition = Condition::new(lookup, parse_expression(rhs));
        conditions.push(if negate { condition.negated() } else { condition });
    }

    Ok(Command::Search {
        conditions,
        ordering,
        count,
    })
}

/// `"text"` stays text, `a,b` becomes a sequence, anything else is inferred.
fn parse_expression(text: &str) -> Expression {
    if let Some(quoted) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Expression::from(quoted);
    }
    if text.contains(',') {
        return Expression::Sequence(text.split(',').map(Scalar::infer).collect());
    }
    Expression::Scalar(Scalar::infer(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit", Command::Exit),
            ("get foo", Command::Get("foo".to_string())),
            ("out foo", Command::Out("foo".to_string())),
            ("  rnum ", Command::Rnum),
            ("stat", Command::Stat),
            ("keys", Command::Keys(None)),
            ("keys user:", Command::Keys(Some("user:".to_string()))),
            ("vanish", Command::Vanish),
            ("sync", Command::Sync),
        ];

        for (cmd, expected) in inputs {
            let command: Command = cmd.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn put_text_and_columns() {
        let command: Command = "put greeting hello world".try_into().unwrap();
        assert_eq!(
            command,
            Command::Put {
                key: "greeting".to_string(),
                value: Value::from("hello world"),
            }
        );

        let command: Command = "put a name=Foo price=1".try_into().unwrap();
        assert_eq!(
            command,
            Command::Put {
                key: "a".to_string(),
                value: Value::from([("name", "Foo"), ("price", "1")]),
            }
        );
    }

    #[test]
    fn search_terms() {
        let command: Command = "search price__gt=1 !name=Foo tags__in=a,b order=-price:num count"
            .try_into()
            .unwrap();

        assert_eq!(
            command,
            Command::Search {
                conditions: vec![
                    Condition::new("price__gt", 1),
                    Condition::new("name", "Foo").negated(),
                    Condition::new("tags__in", ["a", "b"]),
                ],
                ordering: Some(Ordering::parse("-price").numeric()),
                count: true,
            }
        );
    }

    #[test]
    fn quoted_expression_stays_text() {
        let command: Command = "search code=\"42\"".try_into().unwrap();
        let Command::Search { conditions, .. } = command else {
            panic!("expected a search");
        };
        assert_eq!(conditions[0].expression(), &Expression::from("42"));
    }

    #[test]
    fn bad_input() {
        assert_eq!(Command::try_from("   "), Err(CommandError::Empty));
        assert_eq!(
            Command::try_from("select"),
            Err(CommandError::UnrecognizedCommand("select".to_string()))
        );
        assert!(matches!(
            Command::try_from("get"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            Command::try_from("search price"),
            Err(CommandError::InvalidSearchTerm { .. })
        ));
        assert!(matches!(
            Command::try_from("search order=-"),
            Err(CommandError::InvalidSearchTerm { .. })
        ));
    }
}
