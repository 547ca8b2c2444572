use tracing::{debug, info};

use crate::{
    config::SyncConfig,
    connection::{Connection, Side},
    errors::ContentSyncError,
    repository::{BaseRepository, FindOptions, IndexedRows},
    skip::{SkipQuery, SkipTableVoter, SkipVoter, Vote, cast_votes},
    stats::{QueryStatistics, SkipStatistics},
    value::FilterValue,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub repository: QueryStatistics,
    pub skip: SkipStatistics,
}

/// Rows found for the same lookup on both sides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SideBySide {
    pub local: IndexedRows,
    pub foreign: IndexedRows,
}

/// State owned by one execution: the repository with its preload cache and the
/// skip voter with its emptiness memo. Dropped, never shared, at the end of the
/// run; [`SyncRun::finish`] flushes the statistics.
pub struct SyncRun<'c, L, F> {
    local: &'c L,
    foreign: &'c F,
    repository: BaseRepository<SyncConfig>,
    voter: Option<SkipTableVoter<&'c L, &'c F>>,
}

impl<'c, L, F> SyncRun<'c, L, F>
where
    L: Connection,
    F: Connection,
{
    pub fn new(config: SyncConfig, local: &'c L, foreign: &'c F) -> Self {
        let voter = config
            .skip_empty_tables_enabled()
            .then(|| SkipTableVoter::new(local, foreign));
        debug!(
            local = %local.handle(),
            foreign = %foreign.handle(),
            skip_empty_tables = voter.is_some(),
            "sync run started"
        );
        Self {
            local,
            foreign,
            repository: BaseRepository::new(config),
            voter,
        }
    }

    pub fn connection(&self, side: Side) -> &dyn Connection {
        match side {
            Side::Local => self.local,
            Side::Foreign => self.foreign,
        }
    }

    pub fn repository(&mut self) -> &mut BaseRepository<SyncConfig> {
        &mut self.repository
    }

    pub fn voter(&mut self) -> Option<&mut SkipTableVoter<&'c L, &'c F>> {
        self.voter.as_mut()
    }

    pub fn should_skip(&mut self, query: &SkipQuery<'_>) -> Vote {
        match self.voter.as_mut() {
            Some(voter) => cast_votes(&mut [voter as &mut dyn SkipVoter], query),
            None => Vote::NoOpinion,
        }
    }

    /// Runs the same property lookup on both sides unless the table is known to
    /// be empty everywhere, in which case `None` is returned without querying.
    pub fn find_on_both_sides<V>(
        &mut self,
        property_name: &str,
        property_value: V,
        options: &FindOptions,
    ) -> Result<Option<SideBySide>, ContentSyncError>
    where
        V: Into<FilterValue>,
    {
        let value = property_value.into();
        if let Some(table) = options.table_name.as_deref() {
            if self.should_skip(&SkipQuery::FindByProperty { table }).is_skip() {
                return Ok(None);
            }
        }
        let local = self.repository.find_properties_by_property(
            self.local,
            property_name,
            value.clone(),
            options,
        )?;
        let foreign =
            self.repository
                .find_properties_by_property(self.foreign, property_name, value, options)?;
        Ok(Some(SideBySide { local, foreign }))
    }

    pub fn finish(mut self) -> RunStatistics {
        let repository = self.repository.drain_statistics();
        let skip = self
            .voter
            .as_mut()
            .map(|voter| voter.drain_statistics())
            .unwrap_or_default();
        info!(
            queries = repository.functions.values().sum::<u64>(),
            probes = skip.query.values().sum::<u64>(),
            skips = skip.skip.values().sum::<u64>(),
            "sync run finished"
        );
        RunStatistics { repository, skip }
    }
}
