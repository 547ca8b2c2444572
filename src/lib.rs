//! Query and caching core for synchronizing records between a local and a
//! foreign database: a table-agnostic repository with whole-table preloading,
//! and a voter pruning relations into tables that are empty on both sides.
//! Run Criterion benchmarks with `cargo bench` to compare preload and SQL lookups.

pub mod cache;
pub mod clause;
pub mod config;
pub mod connection;
pub mod errors;
pub mod identifier;
pub mod query;
pub mod repository;
pub mod run;
pub mod skip;
#[cfg(feature = "sqlite-backend")]
pub mod sqlite;
pub mod stats;
pub mod value;

pub use crate::config::{SchemaProvider, SyncConfig, TableConfig};
pub use crate::connection::{Connection, ConnectionHandle, ExecutionContext, Side};
pub use crate::errors::ContentSyncError;
pub use crate::identifier::{RecordIdentifier, join_combined_identifier, split_combined_identifier};
pub use crate::repository::{BaseRepository, FindOptions, IndexedRows, QueryFailure};
pub use crate::run::{RunStatistics, SideBySide, SyncRun};
pub use crate::skip::{ColumnConfig, SkipQuery, SkipTableVoter, SkipVoter, Vote, cast_votes};
#[cfg(feature = "sqlite-backend")]
pub use crate::sqlite::SqliteConnection;
pub use crate::value::{FilterValue, Row, SqlValue};
