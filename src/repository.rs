//! Table-agnostic filtered read/write primitive shared by the domain repositories.
//!
//! Reads against tables listed in `factory.preload` are answered from a
//! whole-table cache whenever the filter is simple enough to evaluate in memory;
//! everything else becomes one SQL statement. Writes never return errors: they
//! log and report a success flag.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{
    cache::{PreloadCache, PreloadStats},
    clause::{
        OrderTerm, SimpleWhereClauseParser, SortDirection, WhereClauseParser, extract_order_by,
        parse_order_by, unqualified_column,
    },
    config::SchemaProvider,
    connection::Connection,
    errors::ContentSyncError,
    identifier::{IDENTIFIER_FIELD, RecordIdentifier, row_key},
    query::{Predicate, SelectQuery},
    stats::QueryStatistics,
    value::{FilterValue, Row, SqlValue},
};

const FIND_BY_PROPERTY: &str = "find_properties_by_property";
const FIND_BY_PROPERTIES: &str = "find_properties_by_properties";
const FIND_ALL: &str = "find_all";
const UPDATE_RECORD: &str = "update_record";
const ADD_RECORD: &str = "add_record";
const DELETE_RECORD: &str = "delete_record";
const COUNT_RECORD: &str = "count_record";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FindOptions {
    /// Extra WHERE fragment; may end in `ORDER BY <col> [ASC|DESC]`.
    pub additional_where: String,
    pub group_by: String,
    /// `col [ASC|DESC], ...`
    pub order_by: String,
    /// 0 means unlimited.
    pub limit: usize,
    /// Column (or comma separated columns) the result is keyed by.
    pub index_field: String,
    /// `None` selects the deprecated repository-wide table name.
    pub table_name: Option<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            additional_where: String::new(),
            group_by: String::new(),
            order_by: String::new(),
            limit: 0,
            index_field: IDENTIFIER_FIELD.to_string(),
            table_name: None,
        }
    }
}

impl FindOptions {
    pub fn for_table(table: &str) -> Self {
        Self {
            table_name: Some(table.to_string()),
            ..Self::default()
        }
    }

    pub fn with_where(mut self, additional_where: &str) -> Self {
        self.additional_where = additional_where.to_string();
        self
    }

    pub fn group_by(mut self, group_by: &str) -> Self {
        self.group_by = group_by.to_string();
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = order_by.to_string();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn index_field(mut self, index_field: &str) -> Self {
        self.index_field = index_field.to_string();
        self
    }
}

/// Rows keyed by their index field value, in result order. Inserting an
/// existing key replaces the row but keeps the key's first position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexedRows {
    positions: AHashMap<String, usize>,
    entries: Vec<(String, Row)>,
}

impl IndexedRows {
    pub fn insert(&mut self, key: String, row: Row) {
        match self.positions.get(&key) {
            Some(&position) => self.entries[position].1 = row,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, row));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Row> {
        self.positions.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.entries.iter().map(|(_, row)| row)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.entries.iter().map(|(key, row)| (key.as_str(), row))
    }
}

/// Keys rows by `index_field`. Several comma separated fields build a combined
/// key; a row lacking a single index field is keyed by its position instead.
pub fn index_rows<I>(index_field: &str, rows: I) -> IndexedRows
where
    I: IntoIterator<Item = Row>,
{
    let columns: Vec<&str> = index_field.split(',').map(str::trim).collect();
    let mut indexed = IndexedRows::default();
    for (position, row) in rows.into_iter().enumerate() {
        let key = if columns.len() > 1 {
            row_key(&row, &columns)
        } else {
            match row.get(columns[0]) {
                Some(value) => value.as_key(),
                None => position.to_string(),
            }
        };
        indexed.insert(key, row);
    }
    indexed
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PreloadMatch {
    Null,
    Equals(String),
    AnyOf(Vec<String>),
}

impl PreloadMatch {
    fn from_filter(value: &FilterValue) -> Self {
        match value {
            FilterValue::Null | FilterValue::Scalar(SqlValue::Null) => PreloadMatch::Null,
            FilterValue::Scalar(scalar) => PreloadMatch::Equals(scalar.as_key().to_lowercase()),
            FilterValue::List(items) => {
                PreloadMatch::AnyOf(items.iter().filter_map(SqlValue::normalized).collect())
            }
        }
    }

    fn matches(&self, value: Option<&SqlValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            PreloadMatch::Null => value.is_null(),
            PreloadMatch::Equals(expected) => value.normalized().as_ref() == Some(expected),
            PreloadMatch::AnyOf(expected) => value
                .normalized()
                .is_some_and(|normalized| expected.contains(&normalized)),
        }
    }
}

type PreloadFilter = Vec<(String, PreloadMatch)>;

fn set_match(filter: &mut PreloadFilter, column: &str, expected: PreloadMatch) {
    match filter.iter_mut().find(|(name, _)| name == column) {
        Some(entry) => entry.1 = expected,
        None => filter.push((column.to_string(), expected)),
    }
}

struct QueryPlan {
    filter: String,
    order: Vec<OrderTerm>,
}

/// A write helper failure as it was logged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub method: String,
    pub table: String,
    /// Error code of the failed statement; -1 when no statement was sent.
    pub errno: i32,
    pub error: Vec<String>,
    pub reason: String,
}

impl QueryFailure {
    fn statement<C>(method: &str, connection: &C, table: &str, reason: &str) -> Self
    where
        C: Connection + ?Sized,
    {
        Self {
            method: method.to_string(),
            table: table.to_string(),
            errno: connection.error_code(),
            error: connection.error_info(),
            reason: reason.to_string(),
        }
    }

    fn rejected(method: &str, table: &str, reason: &str) -> Self {
        Self {
            method: method.to_string(),
            table: table.to_string(),
            errno: -1,
            error: vec![reason.to_string()],
            reason: reason.to_string(),
        }
    }

    /// Input errors are raised before anything reaches the database, so the
    /// connection's error state belongs to an earlier statement.
    fn from_error<C>(method: &str, connection: &C, table: &str, err: &ContentSyncError) -> Self
    where
        C: Connection + ?Sized,
    {
        match err {
            ContentSyncError::InvalidInput(_) => Self::rejected(method, table, &err.to_string()),
            _ => Self::statement(method, connection, table, &err.to_string()),
        }
    }
}

pub struct BaseRepository<S, P = SimpleWhereClauseParser> {
    schema: S,
    parser: P,
    preload_tables: AHashSet<String>,
    preload_cache: PreloadCache,
    statistics: QueryStatistics,
    last_failure: Option<QueryFailure>,
    legacy_table_name: String,
    legacy_identifier_field: String,
}

impl<S> BaseRepository<S, SimpleWhereClauseParser>
where
    S: SchemaProvider,
{
    pub fn new(schema: S) -> Self {
        Self::with_parser(schema, SimpleWhereClauseParser)
    }
}

impl<S, P> BaseRepository<S, P>
where
    S: SchemaProvider,
    P: WhereClauseParser,
{
    pub fn with_parser(schema: S, parser: P) -> Self {
        let preload_tables = schema.preload_tables().into_iter().collect();
        Self {
            schema,
            parser,
            preload_tables,
            preload_cache: PreloadCache::new(),
            statistics: QueryStatistics::default(),
            last_failure: None,
            legacy_table_name: String::new(),
            legacy_identifier_field: IDENTIFIER_FIELD.to_string(),
        }
    }

    pub fn is_preload_table(&self, table: &str) -> bool {
        self.preload_tables.contains(table)
    }

    /// Rows of `table` whose `property_name` matches `property_value`, keyed by
    /// `options.index_field`. Query failures are returned to the caller.
    pub fn find_properties_by_property<C, V>(
        &mut self,
        connection: &C,
        property_name: &str,
        property_value: V,
        options: &FindOptions,
    ) -> Result<IndexedRows, ContentSyncError>
    where
        C: Connection + ?Sized,
        V: Into<FilterValue>,
    {
        let table = self.resolve_table(options.table_name.as_deref(), FIND_BY_PROPERTY);
        if table.is_empty() {
            return Ok(IndexedRows::default());
        }
        let value = property_value.into();
        let plan = self.plan(&table, options);

        if let Some((mut filter, order)) = self.preload_plan(&table, &plan, options) {
            set_match(&mut filter, property_name, PreloadMatch::from_filter(&value));
            self.statistics.record(FIND_BY_PROPERTY, &table);
            return self.find_preloaded(connection, &table, &filter, &order, options);
        }

        let query = self
            .select(&table, &plan, options)
            .filter(Predicate::for_filter(property_name, &value));
        self.run_select(connection, FIND_BY_PROPERTY, &table, query, options)
    }

    /// Like [`Self::find_properties_by_property`] with several AND-ed properties.
    pub fn find_properties_by_properties<C>(
        &mut self,
        connection: &C,
        properties: &[(&str, FilterValue)],
        options: &FindOptions,
    ) -> Result<IndexedRows, ContentSyncError>
    where
        C: Connection + ?Sized,
    {
        let table = self.resolve_table(options.table_name.as_deref(), FIND_BY_PROPERTIES);
        if table.is_empty() {
            return Ok(IndexedRows::default());
        }
        let plan = self.plan(&table, options);

        if let Some((mut filter, order)) = self.preload_plan(&table, &plan, options) {
            for (name, value) in properties {
                set_match(&mut filter, name, PreloadMatch::from_filter(value));
            }
            self.statistics.record(FIND_BY_PROPERTIES, &table);
            return self.find_preloaded(connection, &table, &filter, &order, options);
        }

        let query = properties
            .iter()
            .fold(self.select(&table, &plan, options), |query, (name, value)| {
                query.filter(Predicate::for_filter(name, value))
            });
        self.run_select(connection, FIND_BY_PROPERTIES, &table, query, options)
    }

    /// Every row of the table, without restrictions. Only sensible for tables
    /// with a few thousand rows at most.
    pub fn find_all<C>(&mut self, connection: &C, table: &str) -> Result<Vec<Row>, ContentSyncError>
    where
        C: Connection + ?Sized,
    {
        self.statistics.record(FIND_ALL, table);
        connection.select(&SelectQuery::from_table(table).without_restrictions())
    }

    /// Overwrites `properties` of the addressed record. Combined identifiers are
    /// split into the table's compound key columns.
    pub fn update_record<C, I>(
        &mut self,
        connection: &C,
        identifier: I,
        properties: &Row,
        table_name: Option<&str>,
    ) -> bool
    where
        C: Connection + ?Sized,
        I: Into<RecordIdentifier>,
    {
        let table = self.resolve_table(table_name, UPDATE_RECORD);
        if table.is_empty() {
            return false;
        }
        self.statistics.record(UPDATE_RECORD, &table);
        let criteria = match self.criteria_for(&table, identifier.into()) {
            Ok(criteria) => criteria,
            Err(err) => {
                self.fail(QueryFailure::rejected(UPDATE_RECORD, &table, &err.to_string()));
                return false;
            }
        };
        match connection.update(&table, properties, &criteria) {
            Ok(_) => true,
            Err(err) => {
                self.fail(QueryFailure::from_error(UPDATE_RECORD, connection, &table, &err));
                false
            }
        }
    }

    /// Inserts a new row; a missing `uid` is assigned by the database.
    pub fn add_record<C>(&mut self, connection: &C, properties: &Row, table_name: Option<&str>) -> bool
    where
        C: Connection + ?Sized,
    {
        let table = self.resolve_table(table_name, ADD_RECORD);
        if table.is_empty() {
            return false;
        }
        self.statistics.record(ADD_RECORD, &table);
        match connection.insert(&table, properties) {
            Ok(affected) if affected > 0 => true,
            Ok(_) => {
                self.fail(QueryFailure::statement(ADD_RECORD, connection, &table, "no row inserted"));
                false
            }
            Err(err) => {
                self.fail(QueryFailure::from_error(ADD_RECORD, connection, &table, &err));
                false
            }
        }
    }

    /// Removes the addressed row for good. Soft deletion is an
    /// [`Self::update_record`] setting the delete flag.
    pub fn delete_record<C, I>(
        &mut self,
        connection: &C,
        identifier: I,
        table_name: Option<&str>,
    ) -> bool
    where
        C: Connection + ?Sized,
        I: Into<RecordIdentifier>,
    {
        let table = self.resolve_table(table_name, DELETE_RECORD);
        if table.is_empty() {
            return false;
        }
        self.statistics.record(DELETE_RECORD, &table);
        let criteria = match self.criteria_for(&table, identifier.into()) {
            Ok(criteria) => criteria,
            Err(err) => {
                self.fail(QueryFailure::rejected(DELETE_RECORD, &table, &err.to_string()));
                return false;
            }
        };
        match connection.delete(&table, &criteria) {
            Ok(affected) if affected > 0 => true,
            Ok(_) => {
                self.fail(QueryFailure::statement(DELETE_RECORD, connection, &table, "no row deleted"));
                false
            }
            Err(err) => {
                self.fail(QueryFailure::from_error(DELETE_RECORD, connection, &table, &err));
                false
            }
        }
    }

    /// Number of rows where `id_field_name` equals `identifier`. Combined
    /// identifiers are not supported here.
    pub fn count_record<C, V>(
        &mut self,
        connection: &C,
        identifier: V,
        table_name: Option<&str>,
        id_field_name: &str,
    ) -> Option<i64>
    where
        C: Connection + ?Sized,
        V: Into<SqlValue>,
    {
        let table = self.resolve_table(table_name, COUNT_RECORD);
        if table.is_empty() {
            return None;
        }
        self.statistics.record(COUNT_RECORD, &table);
        let criteria = Row::new().with(id_field_name, identifier);
        match connection.count(&table, &criteria) {
            Ok(count) => Some(count),
            Err(err) => {
                self.fail(QueryFailure::from_error(COUNT_RECORD, connection, &table, &err));
                None
            }
        }
    }

    pub fn statistics(&self) -> &QueryStatistics {
        &self.statistics
    }

    /// The most recent failed write or count, kept until the next failure.
    pub fn last_failure(&self) -> Option<&QueryFailure> {
        self.last_failure.as_ref()
    }

    pub fn preload_stats(&self) -> PreloadStats {
        self.preload_cache.stats()
    }

    /// Logs the collected counters and resets them. Call once at the end of a run.
    pub fn drain_statistics(&mut self) -> QueryStatistics {
        let statistics = std::mem::take(&mut self.statistics);
        debug!(
            statistics = %serde_json::to_string(&statistics).unwrap_or_default(),
            "BaseRepository query statistics"
        );
        statistics
    }

    #[deprecated(note = "pass the table name to each call instead")]
    pub fn table_name(&self) -> &str {
        warn!("BaseRepository::table_name is deprecated");
        &self.legacy_table_name
    }

    #[deprecated(note = "pass the table name to each call instead")]
    pub fn set_table_name(&mut self, table: &str) -> &mut Self {
        warn!("BaseRepository::set_table_name is deprecated");
        self.legacy_table_name = table.to_string();
        self
    }

    #[deprecated(note = "pass the table name to each call instead")]
    pub fn replace_table_name(&mut self, table: &str) -> String {
        warn!("BaseRepository::replace_table_name is deprecated");
        std::mem::replace(&mut self.legacy_table_name, table.to_string())
    }

    #[deprecated(note = "records are always addressed by uid or a combined identifier")]
    pub fn identifier_field_name(&self) -> &str {
        warn!("BaseRepository::identifier_field_name is deprecated");
        &self.legacy_identifier_field
    }

    fn fail(&mut self, failure: QueryFailure) {
        error!(
            severity = "critical",
            errno = failure.errno,
            error = %serde_json::to_string(&failure.error).unwrap_or_default(),
            table_name = %failure.table,
            reason = %failure.reason,
            "{}: Query failed.",
            failure.method
        );
        self.last_failure = Some(failure);
    }

    fn resolve_table(&self, table_name: Option<&str>, method: &str) -> String {
        match table_name {
            Some(table) => table.to_string(),
            None => {
                warn!(
                    method,
                    "The repository-wide table name is deprecated. Pass the table name argument instead."
                );
                self.legacy_table_name.clone()
            }
        }
    }

    fn plan(&self, table: &str, options: &FindOptions) -> QueryPlan {
        let clause = extract_order_by(&options.additional_where);
        let mut order = match clause.order {
            Some(term) => vec![term],
            None => parse_order_by(&options.order_by),
        };
        if order.is_empty() {
            if let Some(column) = self.schema.sorting_field(table) {
                order.push(OrderTerm::asc(&column));
            }
        }
        QueryPlan {
            filter: clause.filter,
            order,
        }
    }

    /// In-memory filter and sort order for a preload-eligible lookup, or `None`
    /// when the lookup has to go to SQL. Columns qualified with the queried
    /// table are looked up unqualified; any other qualifier disables preloading.
    fn preload_plan(
        &self,
        table: &str,
        plan: &QueryPlan,
        options: &FindOptions,
    ) -> Option<(PreloadFilter, Vec<OrderTerm>)> {
        if !self.is_preload_table(table) || !options.group_by.trim().is_empty() {
            return None;
        }
        let parsed = self.parser.parse_to_property_map(&plan.filter, table)?;
        let order = plan
            .order
            .iter()
            .map(|term| {
                Some(OrderTerm {
                    column: unqualified_column(&term.column, table)?,
                    direction: term.direction,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        let filter = parsed
            .into_iter()
            .map(|(column, value)| (column, PreloadMatch::Equals(value)))
            .collect();
        Some((filter, order))
    }

    fn select(&self, table: &str, plan: &QueryPlan, options: &FindOptions) -> SelectQuery {
        let mut query = SelectQuery::from_table(table).without_restrictions();
        let filter = strip_leading_and(&plan.filter);
        if !filter.is_empty() {
            query = query.and_where(filter);
        }
        if !options.group_by.trim().is_empty() {
            query = query.group_by(options.group_by.trim());
        }
        if !plan.order.is_empty() {
            query = query.order_by(plan.order.clone());
        }
        if options.limit > 0 {
            query = query.limit(options.limit);
        }
        query
    }

    fn run_select<C>(
        &mut self,
        connection: &C,
        method: &str,
        table: &str,
        query: SelectQuery,
        options: &FindOptions,
    ) -> Result<IndexedRows, ContentSyncError>
    where
        C: Connection + ?Sized,
    {
        self.statistics.record(method, table);
        let rows = connection.select(&query)?;
        Ok(index_rows(&options.index_field, rows))
    }

    /// Filters the cached table, truncates to the limit and only then sorts the
    /// surviving rows.
    fn find_preloaded<C>(
        &mut self,
        connection: &C,
        table: &str,
        filter: &PreloadFilter,
        order: &[OrderTerm],
        options: &FindOptions,
    ) -> Result<IndexedRows, ContentSyncError>
    where
        C: Connection + ?Sized,
    {
        let handle = connection.handle();
        if !self.preload_cache.contains(handle, table) {
            let rows = self.find_all(connection, table)?;
            self.preload_cache.insert(handle, table, rows);
        }
        let cached = self.preload_cache.get(handle, table).unwrap_or(&[]);

        let mut matching: Vec<&Row> = cached
            .iter()
            .filter(|row| {
                filter
                    .iter()
                    .all(|(column, expected)| expected.matches(row.get(column)))
            })
            .collect();
        if options.limit > 0 && options.limit < matching.len() {
            matching.truncate(options.limit);
        }
        if !order.is_empty() {
            sort_rows(&mut matching, order);
        }
        Ok(index_rows(&options.index_field, matching.into_iter().cloned()))
    }

    fn criteria_for(&self, table: &str, identifier: RecordIdentifier) -> Result<Row, ContentSyncError> {
        if identifier.is_combined() {
            identifier.to_criteria(&self.schema.compound_key_columns(table))
        } else {
            identifier.to_criteria(&[])
        }
    }
}

/// Stable multi-column sort; rows comparing equal keep their cache order.
fn sort_rows(rows: &mut [&Row], order: &[OrderTerm]) {
    rows.sort_by(|left, right| {
        for term in order {
            let left_value = left.get(&term.column).unwrap_or(&SqlValue::Null);
            let right_value = right.get(&term.column).unwrap_or(&SqlValue::Null);
            let ordering = match term.direction {
                SortDirection::Asc => left_value.compare(right_value),
                SortDirection::Desc => right_value.compare(left_value),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn strip_leading_and(filter: &str) -> &str {
    let trimmed = filter.trim();
    let bytes = trimmed.as_bytes();
    let leading_and = bytes.len() >= 3
        && bytes[..3].eq_ignore_ascii_case(b"and")
        && bytes
            .get(3)
            .is_none_or(|b| !(b.is_ascii_alphanumeric() || *b == b'_'));
    if leading_and {
        trimmed[3..].trim()
    } else {
        trimmed
    }
}
