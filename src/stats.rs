use std::collections::BTreeMap;

use serde::Serialize;

/// Repository query counters, keyed by operation and by table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueryStatistics {
    pub functions: BTreeMap<String, u64>,
    pub tables: BTreeMap<String, u64>,
}

impl QueryStatistics {
    pub fn record(&mut self, function: &str, table: &str) {
        bump(&mut self.functions, function);
        bump(&mut self.tables, table);
    }

    pub fn function_count(&self, function: &str) -> u64 {
        self.functions.get(function).copied().unwrap_or(0)
    }

    pub fn table_count(&self, table: &str) -> u64 {
        self.tables.get(table).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.tables.is_empty()
    }
}

/// Skip voter counters: emptiness probes issued and skips cast, per table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SkipStatistics {
    pub query: BTreeMap<String, u64>,
    pub skip: BTreeMap<String, u64>,
}

impl SkipStatistics {
    pub fn record_query(&mut self, table: &str) {
        bump(&mut self.query, table);
    }

    pub fn record_skip(&mut self, key: &str) {
        bump(&mut self.skip, key);
    }

    pub fn query_count(&self, table: &str) -> u64 {
        self.query.get(table).copied().unwrap_or(0)
    }

    pub fn skip_count(&self, key: &str) -> u64 {
        self.skip.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty() && self.skip.is_empty()
    }
}

fn bump(counters: &mut BTreeMap<String, u64>, key: &str) {
    *counters.entry(key.to_string()).or_insert(0) += 1;
}
