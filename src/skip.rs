//! Relation pruning for the record graph walk. A table without rows on both the
//! local and the foreign side can never contribute related records, so any
//! lookup into it can be skipped for the rest of the run.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{connection::Connection, stats::SkipStatistics};

const RELATION_TYPES: [&str; 3] = ["select", "group", "inline"];
const WILDCARD_TABLE: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    Skip,
    NoOpinion,
}

impl Vote {
    pub fn is_skip(&self) -> bool {
        matches!(self, Vote::Skip)
    }

    pub fn or(self, other: Vote) -> Vote {
        if self.is_skip() || other.is_skip() {
            Vote::Skip
        } else {
            Vote::NoOpinion
        }
    }
}

/// TCA-style relation metadata of one column, read only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub internal_type: Option<String>,
    pub foreign_table: Option<String>,
    #[serde(rename = "MM")]
    pub mm: Option<String>,
    pub allowed: Option<String>,
}

impl ColumnConfig {
    pub fn of_type(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub fn group_db(allowed: &str) -> Self {
        Self {
            kind: Some("group".to_string()),
            internal_type: Some("db".to_string()),
            allowed: Some(allowed.to_string()),
            ..Self::default()
        }
    }

    pub fn with_foreign_table(mut self, table: &str) -> Self {
        self.foreign_table = Some(table.to_string());
        self
    }

    pub fn with_mm(mut self, table: &str) -> Self {
        self.mm = Some(table.to_string());
        self
    }

    fn is_relation(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| RELATION_TYPES.contains(&kind))
    }

    fn is_group_db(&self) -> bool {
        self.kind.as_deref() == Some("group") && self.internal_type.as_deref() == Some("db")
    }
}

/// The lookups of the graph walk that may be skipped.
#[derive(Clone, Copy, Debug)]
pub enum SkipQuery<'a> {
    FindByIdentifier { table: &'a str },
    FindByProperty { table: &'a str },
    RelatedByTable { table: &'a str },
    RelatedByProperty { column: &'a ColumnConfig },
}

pub trait SkipVoter {
    fn vote(&mut self, query: &SkipQuery<'_>) -> Vote;
}

/// Asks every voter and skips if any of them says so.
pub fn cast_votes(voters: &mut [&mut dyn SkipVoter], query: &SkipQuery<'_>) -> Vote {
    voters
        .iter_mut()
        .fold(Vote::NoOpinion, |vote, voter| vote.or(voter.vote(query)))
}

pub struct SkipTableVoter<L, F> {
    local: L,
    foreign: F,
    tables: AHashMap<String, bool>,
    statistics: SkipStatistics,
}

impl<L, F> SkipTableVoter<L, F>
where
    L: Connection,
    F: Connection,
{
    pub fn new(local: L, foreign: F) -> Self {
        Self {
            local,
            foreign,
            tables: AHashMap::new(),
            statistics: SkipStatistics::default(),
        }
    }

    pub fn should_skip_searching_for_related_records_by_property(
        &mut self,
        column: &ColumnConfig,
    ) -> Vote {
        if !column.is_relation() {
            return Vote::NoOpinion;
        }
        for table in [column.mm.as_deref(), column.foreign_table.as_deref()]
            .into_iter()
            .flatten()
        {
            if self.is_empty_table(table) {
                self.statistics.record_skip(table);
                return Vote::Skip;
            }
        }
        if self.all_allowed_tables_are_empty(column) {
            if let Some(allowed) = column.allowed.as_deref() {
                self.statistics.record_skip(allowed);
            }
            return Vote::Skip;
        }
        Vote::NoOpinion
    }

    pub fn should_skip_find_by_identifier(&mut self, table: &str) -> Vote {
        self.vote_for_table(table)
    }

    pub fn should_skip_find_by_property(&mut self, table: &str) -> Vote {
        self.vote_for_table(table)
    }

    pub fn should_skip_find_by_table(&mut self, table: &str) -> Vote {
        self.vote_for_table(table)
    }

    /// Memoized: each table is probed at most once per side for the voter's life.
    /// The foreign side is only probed when the local side is empty.
    pub fn is_empty_table(&mut self, table: &str) -> bool {
        if let Some(&empty) = self.tables.get(table) {
            return empty;
        }
        let empty = probe_empty(&self.local, table, &mut self.statistics)
            && probe_empty(&self.foreign, table, &mut self.statistics);
        self.tables.insert(table.to_string(), empty);
        empty
    }

    pub fn statistics(&self) -> &SkipStatistics {
        &self.statistics
    }

    /// Logs the probe and skip counters (sorted by table) and resets them.
    pub fn drain_statistics(&mut self) -> SkipStatistics {
        let statistics = std::mem::take(&mut self.statistics);
        debug!(
            statistics = %serde_json::to_string(&statistics).unwrap_or_default(),
            "SkipTableVoter statistics"
        );
        statistics
    }

    fn vote_for_table(&mut self, table: &str) -> Vote {
        if self.is_empty_table(table) {
            self.statistics.record_skip(table);
            Vote::Skip
        } else {
            Vote::NoOpinion
        }
    }

    fn all_allowed_tables_are_empty(&mut self, column: &ColumnConfig) -> bool {
        if !column.is_group_db() {
            return false;
        }
        let Some(allowed) = column.allowed.as_deref() else {
            return false;
        };
        let tables: Vec<&str> = allowed
            .split(',')
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .collect();
        if tables.is_empty() || tables.contains(&WILDCARD_TABLE) {
            return false;
        }
        tables.into_iter().all(|table| self.is_empty_table(table))
    }
}

impl<L, F> SkipVoter for SkipTableVoter<L, F>
where
    L: Connection,
    F: Connection,
{
    fn vote(&mut self, query: &SkipQuery<'_>) -> Vote {
        match query {
            SkipQuery::FindByIdentifier { table } => self.should_skip_find_by_identifier(table),
            SkipQuery::FindByProperty { table } => self.should_skip_find_by_property(table),
            SkipQuery::RelatedByTable { table } => self.should_skip_find_by_table(table),
            SkipQuery::RelatedByProperty { column } => {
                self.should_skip_searching_for_related_records_by_property(column)
            }
        }
    }
}

/// Raw existence check ignoring any visibility restriction. A failing probe
/// (missing table, dropped connection) counts as "has rows".
fn probe_empty<C>(connection: &C, table: &str, statistics: &mut SkipStatistics) -> bool
where
    C: Connection,
{
    statistics.record_query(table);
    let sql = format!("SELECT 1 FROM {}", connection.quote_identifier(table));
    match connection.fetch_first_column(&sql) {
        Ok(first) => first.is_none(),
        Err(err) => {
            debug!(table, error = %err, handle = %connection.handle(), "emptiness probe failed");
            false
        }
    }
}
