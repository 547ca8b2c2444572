//! Record identifiers. Join-table rows have no `uid` of their own and are
//! addressed by a combined identifier: their key column values joined by a comma.

use std::fmt;

use crate::{
    errors::ContentSyncError,
    value::{Row, SqlValue, is_integer_like},
};

pub const COMBINED_IDENTIFIER_SEPARATOR: char = ',';
pub const IDENTIFIER_FIELD: &str = "uid";
pub const DEFAULT_COMPOUND_KEY: [&str; 2] = ["uid_local", "uid_foreign"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordIdentifier {
    Single(SqlValue),
    Combined(Vec<String>),
}

impl RecordIdentifier {
    pub fn parse(raw: &str) -> Self {
        if raw.contains(COMBINED_IDENTIFIER_SEPARATOR) {
            RecordIdentifier::Combined(split_combined_identifier(raw))
        } else {
            RecordIdentifier::Single(identifier_part_value(raw))
        }
    }

    pub fn is_combined(&self) -> bool {
        matches!(self, RecordIdentifier::Combined(_))
    }

    /// Builds the WHERE criteria addressing this record. Single identifiers match
    /// `uid`, combined identifiers are zipped with the table's compound key columns.
    pub fn to_criteria(&self, key_columns: &[String]) -> Result<Row, ContentSyncError> {
        match self {
            RecordIdentifier::Single(value) => Ok(Row::new().with(IDENTIFIER_FIELD, value.clone())),
            RecordIdentifier::Combined(values) => {
                if values.len() != key_columns.len() {
                    return Err(ContentSyncError::invalid_input(format!(
                        "combined identifier {} has {} parts, expected {} ({})",
                        join_unchecked(values),
                        values.len(),
                        key_columns.len(),
                        key_columns.join(", "),
                    )));
                }
                Ok(key_columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| (column.clone(), identifier_part_value(value)))
                    .collect())
            }
        }
    }
}

impl From<i64> for RecordIdentifier {
    fn from(value: i64) -> Self {
        RecordIdentifier::Single(SqlValue::Int(value))
    }
}

impl From<i32> for RecordIdentifier {
    fn from(value: i32) -> Self {
        RecordIdentifier::Single(SqlValue::from(value))
    }
}

impl From<&str> for RecordIdentifier {
    fn from(value: &str) -> Self {
        RecordIdentifier::parse(value)
    }
}

impl From<String> for RecordIdentifier {
    fn from(value: String) -> Self {
        RecordIdentifier::parse(&value)
    }
}

impl fmt::Display for RecordIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIdentifier::Single(value) => write!(f, "{}", value.as_key()),
            RecordIdentifier::Combined(values) => write!(f, "{}", join_unchecked(values)),
        }
    }
}

pub fn split_combined_identifier(identifier: &str) -> Vec<String> {
    identifier
        .split(COMBINED_IDENTIFIER_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// Inverse of [`split_combined_identifier`]. A part containing the separator
/// could never be split back and is rejected.
pub fn join_combined_identifier<I, S>(parts: I) -> Result<String, ContentSyncError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = Vec::new();
    for part in parts {
        let part = part.as_ref();
        if part.contains(COMBINED_IDENTIFIER_SEPARATOR) {
            return Err(ContentSyncError::invalid_input(format!(
                "identifier part {part:?} contains the separator"
            )));
        }
        joined.push(part.to_string());
    }
    Ok(joined.join(","))
}

/// Index key of a row for one or more comma separated key columns.
/// Missing columns contribute an empty part.
pub fn row_key(row: &Row, key_columns: &[&str]) -> String {
    key_columns
        .iter()
        .map(|column| row.get(column).map(SqlValue::as_key).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_unchecked(values: &[String]) -> String {
    values.join(",")
}

fn identifier_part_value(part: &str) -> SqlValue {
    match part.parse::<i64>() {
        Ok(value) if is_integer_like(part) => SqlValue::Int(value),
        _ => SqlValue::Text(part.to_string()),
    }
}
