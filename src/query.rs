use crate::{
    clause::OrderTerm,
    value::{FilterValue, Row, SqlValue},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    IsNull(String),
    Eq(String, SqlValue),
    Like(String, SqlValue),
    In(String, Vec<SqlValue>),
    Raw(String),
}

impl Predicate {
    /// The single place deciding which comparison a filter value turns into:
    /// lists become `IN`, integer-like scalars equality, other scalars `LIKE`.
    pub fn for_filter(column: &str, value: &FilterValue) -> Self {
        let column = column.to_string();
        match value {
            FilterValue::Null | FilterValue::Scalar(SqlValue::Null) => Predicate::IsNull(column),
            FilterValue::List(items) => Predicate::In(column, items.clone()),
            FilterValue::Scalar(scalar) => match scalar.as_integer() {
                Some(number) => Predicate::Eq(column, SqlValue::Int(number)),
                None => Predicate::Like(column, scalar.clone()),
            },
        }
    }

    fn render(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            Predicate::IsNull(column) => format!("{} IS NULL", quote_identifier(column)),
            Predicate::Eq(column, value) => {
                params.push(value.clone());
                format!("{} = ?{}", quote_identifier(column), params.len())
            }
            Predicate::Like(column, value) => {
                params.push(value.clone());
                format!("{} LIKE ?{}", quote_identifier(column), params.len())
            }
            Predicate::In(_, items) if items.is_empty() => "1 = 0".to_string(),
            Predicate::In(column, items) => {
                let quoted: Vec<String> = items.iter().map(quote_literal).collect();
                format!("{} IN ({})", quote_identifier(column), quoted.join(", "))
            }
            Predicate::Raw(fragment) => fragment.clone(),
        }
    }
}

/// Structured `SELECT *` a [`crate::connection::Connection`] knows how to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub predicates: Vec<Predicate>,
    pub group_by: Option<String>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<usize>,
    pub restrictions: bool,
}

impl SelectQuery {
    pub fn from_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            predicates: Vec::new(),
            group_by: None,
            order_by: Vec::new(),
            limit: None,
            restrictions: true,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn and_where(self, fragment: &str) -> Self {
        self.filter(Predicate::Raw(fragment.to_string()))
    }

    pub fn group_by(mut self, group_by: &str) -> Self {
        self.group_by = Some(group_by.to_string());
        self
    }

    pub fn order_by(mut self, terms: Vec<OrderTerm>) -> Self {
        self.order_by = terms;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Drops whatever default visibility filters the connection would add.
    pub fn without_restrictions(mut self) -> Self {
        self.restrictions = false;
        self
    }

    /// Renders positional SQL. `restrictions` are only appended while the
    /// query still has them enabled.
    pub fn to_sql(&self, restrictions: &[String]) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let mut sql = format!("SELECT * FROM {}", quote_identifier(&self.table));

        let mut conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|predicate| format!("({})", predicate.render(&mut params)))
            .collect();
        if self.restrictions {
            conditions.extend(restrictions.iter().map(|r| format!("({r})")));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if let Some(group_by) = &self.group_by {
            let columns: Vec<String> = group_by
                .split(',')
                .map(str::trim)
                .filter(|column| !column.is_empty())
                .map(quote_identifier)
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|term| {
                    format!(
                        "{} {}",
                        quote_identifier(&term.column),
                        term.direction.as_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, params)
    }
}

/// `col = ?N AND ...` for write statements; NULL criteria become `IS NULL`.
/// Placeholders continue after `offset` already bound parameters.
pub fn criteria_sql(criteria: &Row, offset: usize) -> (String, Vec<SqlValue>) {
    let mut params = Vec::new();
    let mut conditions = Vec::new();
    for (column, value) in criteria.iter() {
        if value.is_null() {
            conditions.push(format!("{} IS NULL", quote_identifier(column)));
        } else {
            params.push(value.clone());
            conditions.push(format!(
                "{} = ?{}",
                quote_identifier(column),
                offset + params.len()
            ));
        }
    }
    if conditions.is_empty() {
        return ("1 = 1".to_string(), params);
    }
    (conditions.join(" AND "), params)
}

/// Quotes each dot separated part, so `pages.uid` becomes `"pages"."uid"`.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn quote_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Int(number) => number.to_string(),
        SqlValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
    }
}
