use ahash::AHashMap;

use crate::{connection::ConnectionHandle, value::Row};

/// Whole-table row sets per connection. Entries are filled once and live as
/// long as the cache; nothing invalidates them.
#[derive(Default)]
pub struct PreloadCache {
    inner: AHashMap<ConnectionHandle, AHashMap<String, Vec<Row>>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreloadStats {
    pub tables: usize,
    pub rows: usize,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self {
            inner: AHashMap::new(),
        }
    }

    pub fn get(&self, handle: ConnectionHandle, table: &str) -> Option<&[Row]> {
        self.inner
            .get(&handle)
            .and_then(|tables| tables.get(table))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, handle: ConnectionHandle, table: &str) -> bool {
        self.get(handle, table).is_some()
    }

    pub fn insert(&mut self, handle: ConnectionHandle, table: &str, rows: Vec<Row>) {
        self.inner
            .entry(handle)
            .or_default()
            .insert(table.to_string(), rows);
    }

    pub fn stats(&self) -> PreloadStats {
        self.inner
            .values()
            .flat_map(|tables| tables.values())
            .fold(PreloadStats::default(), |mut stats, rows| {
                stats.tables += 1;
                stats.rows += rows.len();
                stats
            })
    }
}
