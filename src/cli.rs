//! CLI utilities for Tyrant.
//!
//! The utilities present in this module drive the interactive `tyrant_cli`
//! shell: reading a [`Command`] from the user and running it against a
//! [`Tyrant`] handle.
use std::io::{BufRead, Read, Write};

use crate::{
    Command, CommandError, KeyValueStore, Tyrant, TyrantError,
    codec::Value,
    query::Query,
};

/// Prompt user for a command. End of input reads as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")
        .and_then(|_| writer.flush())
        .map_err(|e| CommandError::Input(e.to_string()))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Input(e.to_string()))?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    s.trim_end().try_into()
}

/// Runs `command` and renders its result for display. `Ok(None)` means there
/// is nothing to print.
pub fn execute<S: Read + Write>(
    db: &mut Tyrant<S>,
    command: Command,
) -> Result<Option<String>, TyrantError> {
    match command {
        Command::Exit => Ok(None),
        Command::Get(key) => db.get(&key).map(|value| Some(render(&value))),
        Command::Put { key, value } => db.put(&key, value).map(|_| None),
        Command::Out(key) => db.delete(&key).map(|_| None),
        Command::Stat => Ok(Some(
            db.stats()?
                .iter()
                .map(|(k, v)| format!("{k}\t{v}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )),
        Command::Rnum => Ok(Some(db.len()?.to_string())),
        Command::Keys(None) => Ok(Some(db.keys()?.collect::<Result<Vec<_>, _>>()?.join("\n"))),
        Command::Keys(Some(prefix)) => Ok(Some(db.prefix_keys(&prefix, None)?.join("\n"))),
        Command::Vanish => db.clear().map(|_| None),
        Command::Sync => db.sync().map(|_| None),
        Command::Search {
            conditions,
            ordering,
            count,
        } => {
            let mut query: Query = conditions
                .into_iter()
                .fold(db.query(), |query, condition| query.filter_by(condition));
            if let Some(ordering) = ordering {
                query = query.order_by(ordering);
            }
            if count {
                return Ok(Some(query.count(db.session_mut())?.to_string()));
            }
            Ok(Some(query.keys(db.session_mut())?.join("\n")))
        }
    }
}

/// Text form of a record: raw text, comma separated lists, or
/// space separated `column=value` pairs.
pub fn render(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::List(items) => items
            .iter()
            .map(|item| String::from_utf8_lossy(item).into_owned())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Table(columns) => columns
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
