use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Scalar column value as it travels between a connection and the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// String form used for index keys and combined identifiers. NULL renders empty.
    pub fn as_key(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Int(value) => value.to_string(),
            SqlValue::Text(value) => value.clone(),
        }
    }

    /// Lower-cased string form compared by the preload filter.
    pub fn normalized(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            other => Some(other.as_key().to_lowercase()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(value) => Some(*value),
            SqlValue::Text(value) if is_integer_like(value) => value.parse().ok(),
            SqlValue::Text(_) => None,
        }
    }

    pub fn is_integer_like(&self) -> bool {
        self.as_integer().is_some()
    }

    /// Ordering used when sorting cached rows: NULL first, numbers numerically,
    /// everything else by byte-wise string comparison.
    pub fn compare(&self, other: &SqlValue) -> Ordering {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
            (SqlValue::Null, _) => Ordering::Less,
            (_, SqlValue::Null) => Ordering::Greater,
            _ => match (self.as_integer(), other.as_integer()) {
                (Some(left), Some(right)) => left.cmp(&right),
                _ => self.as_key().cmp(&other.as_key()),
            },
        }
    }
}

/// True when the string is the canonical decimal form of an `i64`
/// (no sign prefix, no leading zeros, no whitespace).
pub fn is_integer_like(value: &str) -> bool {
    value
        .parse::<i64>()
        .map(|parsed| parsed.to_string() == value)
        .unwrap_or(false)
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Ordered column name to value mapping, one database row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<SqlValue>>(mut self, name: K, value: V) -> Self {
        self.set(name, value);
        self
    }

    /// Replaces the value of an existing column in place or appends a new one.
    pub fn set<K: Into<String>, V: Into<SqlValue>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(column, _)| *column == name) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(column, _)| column.as_str())
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.set(name, value);
        }
        row
    }
}

/// Value a property is filtered by. The variant alone decides which predicate
/// is built, see [`crate::query::Predicate::for_filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Null,
    Scalar(SqlValue),
    List(Vec<SqlValue>),
}

impl FilterValue {
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<SqlValue> for FilterValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => FilterValue::Null,
            scalar => FilterValue::Scalar(scalar),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Scalar(SqlValue::Int(value))
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Scalar(SqlValue::from(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(SqlValue::from(value))
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Scalar(SqlValue::Text(value))
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::list(values)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => FilterValue::from(Into::<SqlValue>::into(value)),
            None => FilterValue::Null,
        }
    }
}
