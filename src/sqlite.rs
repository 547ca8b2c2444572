//! rusqlite implementation of [`Connection`]. Compiled with the `sqlite-backend`
//! feature (enabled by default).

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{
    params_from_iter,
    types::{ToSqlOutput, Value, ValueRef},
};

use crate::{
    connection::{Connection, ConnectionHandle},
    errors::ContentSyncError,
    query::{SelectQuery, criteria_sql, quote_identifier},
    value::{Row, SqlValue},
};

#[derive(Clone, Debug)]
struct StatementError {
    code: i32,
    info: Vec<String>,
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    handle: ConnectionHandle,
    restrictions: Vec<String>,
    last_error: Mutex<Option<StatementError>>,
}

impl SqliteConnection {
    pub fn open<P: AsRef<Path>>(
        path: P,
        handle: ConnectionHandle,
    ) -> Result<Self, ContentSyncError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| ContentSyncError::connection(e.to_string()))?;
        Ok(Self::from_connection(conn, handle))
    }

    pub fn open_in_memory(handle: ConnectionHandle) -> Result<Self, ContentSyncError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| ContentSyncError::connection(e.to_string()))?;
        Ok(Self::from_connection(conn, handle))
    }

    pub fn from_connection(conn: rusqlite::Connection, handle: ConnectionHandle) -> Self {
        Self {
            conn,
            handle,
            restrictions: Vec::new(),
            last_error: Mutex::new(None),
        }
    }

    /// Adds a default restriction (e.g. `deleted = 0`) appended to every select
    /// that does not explicitly remove restrictions.
    pub fn with_restriction(mut self, fragment: &str) -> Self {
        self.restrictions.push(fragment.to_string());
        self
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), ContentSyncError> {
        self.track(self.conn.execute_batch(sql))
    }

    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn track<T>(&self, result: rusqlite::Result<T>) -> Result<T, ContentSyncError> {
        match result {
            Ok(value) => {
                *self.last_error.lock() = None;
                Ok(value)
            }
            Err(err) => {
                let code = match &err {
                    rusqlite::Error::SqliteFailure(failure, _) => failure.extended_code,
                    _ => -1,
                };
                let message = err.to_string();
                *self.last_error.lock() = Some(StatementError {
                    code,
                    info: vec![code.to_string(), message.clone()],
                });
                Err(ContentSyncError::query(message))
            }
        }
    }

    /// Fails a call before any statement runs, so the error state never refers
    /// to an earlier statement.
    fn reject<T>(&self, message: &str) -> Result<T, ContentSyncError> {
        *self.last_error.lock() = Some(StatementError {
            code: -1,
            info: vec!["-1".to_string(), message.to_string()],
        });
        Err(ContentSyncError::invalid_input(message))
    }

    fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<usize, ContentSyncError> {
        self.track(self.conn.execute(sql, params_from_iter(params.iter())))
    }
}

impl Connection for SqliteConnection {
    fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, ContentSyncError> {
        let (sql, params) = query.to_sql(&self.restrictions);
        let mut stmt = self.track(self.conn.prepare(&sql))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = self.track(stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut values = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                values.set(column.as_str(), from_value_ref(row.get_ref(idx)?));
            }
            Ok(values)
        }))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(self.track(row)?);
        }
        Ok(result)
    }

    fn fetch_first_column(&self, sql: &str) -> Result<Option<SqlValue>, ContentSyncError> {
        let mut stmt = self.track(self.conn.prepare(sql))?;
        let mut rows = self.track(stmt.query([]))?;
        match self.track(rows.next())? {
            Some(row) => Ok(Some(from_value_ref(self.track(row.get_ref(0))?))),
            None => Ok(None),
        }
    }

    fn execute(&self, sql: &str) -> Result<usize, ContentSyncError> {
        self.execute_with(sql, &[])
    }

    fn insert(&self, table: &str, values: &Row) -> Result<usize, ContentSyncError> {
        if values.is_empty() {
            let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table));
            return self.execute_with(&sql, &[]);
        }
        let columns: Vec<String> = values.column_names().map(quote_identifier).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|idx| format!("?{idx}")).collect();
        let params: Vec<SqlValue> = values.iter().map(|(_, value)| value.clone()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.execute_with(&sql, &params)
    }

    fn update(
        &self,
        table: &str,
        values: &Row,
        criteria: &Row,
    ) -> Result<usize, ContentSyncError> {
        if values.is_empty() {
            return self.reject("update requires values");
        }
        let mut params: Vec<SqlValue> = Vec::new();
        let mut assignments = Vec::new();
        for (column, value) in values.iter() {
            params.push(value.clone());
            assignments.push(format!("{} = ?{}", quote_identifier(column), params.len()));
        }
        let (condition, criteria_params) = criteria_sql(criteria, params.len());
        params.extend(criteria_params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(table),
            assignments.join(", "),
            condition
        );
        self.execute_with(&sql, &params)
    }

    fn delete(&self, table: &str, criteria: &Row) -> Result<usize, ContentSyncError> {
        let (condition, params) = criteria_sql(criteria, 0);
        let sql = format!("DELETE FROM {} WHERE {}", quote_identifier(table), condition);
        self.execute_with(&sql, &params)
    }

    fn count(&self, table: &str, criteria: &Row) -> Result<i64, ContentSyncError> {
        let (condition, params) = criteria_sql(criteria, 0);
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(table),
            condition
        );
        self.track(
            self.conn
                .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0)),
        )
    }

    fn error_code(&self) -> i32 {
        self.last_error
            .lock()
            .as_ref()
            .map(|err| err.code)
            .unwrap_or(0)
    }

    fn error_info(&self) -> Vec<String> {
        self.last_error
            .lock()
            .as_ref()
            .map(|err| err.info.clone())
            .unwrap_or_default()
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Int(number) => ToSqlOutput::Owned(Value::Integer(*number)),
            SqlValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(number) => SqlValue::Int(number),
        ValueRef::Real(number) => SqlValue::Text(number.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
