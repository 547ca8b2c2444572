//! Connection seam between the repository and a concrete database client. One
//! connection is bound to one side of the synchronization; the `sqlite` module
//! provides the implementation shipped with this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    errors::ContentSyncError,
    query::{SelectQuery, quote_identifier},
    value::{Row, SqlValue},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Local,
    Foreign,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Foreign => "foreign",
        }
    }
}

/// Opaque token identifying one live connection within one execution. Caches
/// keyed by connection use this token, never the connection object itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    id: u32,
    side: Side,
}

impl ConnectionHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.side.as_str(), self.id)
    }
}

/// Issues connection handles for one CLI run or one backend request.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    issued: u32,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_handle(&mut self, side: Side) -> ConnectionHandle {
        self.issued += 1;
        ConnectionHandle {
            id: self.issued,
            side,
        }
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}

pub trait Connection {
    fn handle(&self) -> ConnectionHandle;
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, ContentSyncError>;
    /// Runs raw SQL and returns the first column of the first row, if any.
    fn fetch_first_column(&self, sql: &str) -> Result<Option<SqlValue>, ContentSyncError>;
    fn execute(&self, sql: &str) -> Result<usize, ContentSyncError>;
    fn insert(&self, table: &str, values: &Row) -> Result<usize, ContentSyncError>;
    fn update(&self, table: &str, values: &Row, criteria: &Row)
    -> Result<usize, ContentSyncError>;
    fn delete(&self, table: &str, criteria: &Row) -> Result<usize, ContentSyncError>;
    fn count(&self, table: &str, criteria: &Row) -> Result<i64, ContentSyncError>;
    /// Error code of the last statement, 0 when it succeeded.
    fn error_code(&self) -> i32;
    fn error_info(&self) -> Vec<String>;

    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name)
    }
}

impl<C> Connection for &C
where
    C: Connection + ?Sized,
{
    fn handle(&self) -> ConnectionHandle {
        (*self).handle()
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, ContentSyncError> {
        (*self).select(query)
    }

    fn fetch_first_column(&self, sql: &str) -> Result<Option<SqlValue>, ContentSyncError> {
        (*self).fetch_first_column(sql)
    }

    fn execute(&self, sql: &str) -> Result<usize, ContentSyncError> {
        (*self).execute(sql)
    }

    fn insert(&self, table: &str, values: &Row) -> Result<usize, ContentSyncError> {
        (*self).insert(table, values)
    }

    fn update(
        &self,
        table: &str,
        values: &Row,
        criteria: &Row,
    ) -> Result<usize, ContentSyncError> {
        (*self).update(table, values, criteria)
    }

    fn delete(&self, table: &str, criteria: &Row) -> Result<usize, ContentSyncError> {
        (*self).delete(table, criteria)
    }

    fn count(&self, table: &str, criteria: &Row) -> Result<i64, ContentSyncError> {
        (*self).count(table, criteria)
    }

    fn error_code(&self) -> i32 {
        (*self).error_code()
    }

    fn error_info(&self) -> Vec<String> {
        (*self).error_info()
    }

    fn quote_identifier(&self, name: &str) -> String {
        (*self).quote_identifier(name)
    }
}
