use contentsync::{
    Connection, ExecutionContext, FindOptions, Side, SkipQuery, SqliteConnection, SyncConfig,
    SyncRun,
};

const SCHEMA: &str = "
    CREATE TABLE pages (uid INTEGER PRIMARY KEY, pid INTEGER NOT NULL DEFAULT 0);
    CREATE TABLE tt_content (uid INTEGER PRIMARY KEY, pid INTEGER NOT NULL DEFAULT 0);
";

fn connections() -> (SqliteConnection, SqliteConnection) {
    let mut ctx = ExecutionContext::new();
    let local = SqliteConnection::open_in_memory(ctx.issue_handle(Side::Local))
        .expect("open local");
    local.execute_batch(SCHEMA).expect("local schema");
    local
        .execute_batch("INSERT INTO pages (uid, pid) VALUES (1, 0), (2, 1), (3, 1);")
        .expect("local pages");
    let foreign = SqliteConnection::open_in_memory(ctx.issue_handle(Side::Foreign))
        .expect("open foreign");
    foreign.execute_batch(SCHEMA).expect("foreign schema");
    foreign
        .execute_batch("INSERT INTO pages (uid, pid) VALUES (1, 0), (2, 1);")
        .expect("foreign pages");
    (local, foreign)
}

#[test]
fn test_find_on_both_sides() {
    let (local, foreign) = connections();
    let mut run = SyncRun::new(SyncConfig::default(), &local, &foreign);

    let found = run
        .find_on_both_sides("pid", 1, &FindOptions::for_table("pages"))
        .expect("lookup pages")
        .expect("pages is not empty");
    assert_eq!(found.local.keys().collect::<Vec<_>>(), vec!["2", "3"]);
    assert_eq!(found.foreign.keys().collect::<Vec<_>>(), vec!["2"]);
    assert_eq!(run.connection(Side::Foreign).handle().side(), Side::Foreign);
}

#[test]
fn test_empty_tables_are_not_queried() {
    let (local, foreign) = connections();
    let mut run = SyncRun::new(SyncConfig::default(), &local, &foreign);

    let skipped = run
        .find_on_both_sides("pid", 1, &FindOptions::for_table("tt_content"))
        .expect("lookup content");
    assert!(skipped.is_none());
    assert!(run.repository().statistics().is_empty());
    assert!(run.should_skip(&SkipQuery::RelatedByTable { table: "tt_content" }).is_skip());

    let stats = run.finish();
    assert!(stats.repository.is_empty());
    assert_eq!(stats.skip.query_count("tt_content"), 2);
    assert_eq!(stats.skip.skip_count("tt_content"), 2);
}

#[test]
fn test_disabled_voter_always_queries() {
    let (local, foreign) = connections();
    let mut config = SyncConfig::default();
    config.features.skip_empty_tables.enable = false;
    let mut run = SyncRun::new(config, &local, &foreign);
    assert!(run.voter().is_none());

    let found = run
        .find_on_both_sides("pid", 1, &FindOptions::for_table("tt_content"))
        .expect("lookup content")
        .expect("no voter, no skip");
    assert!(found.local.is_empty() && found.foreign.is_empty());
    assert!(!run.should_skip(&SkipQuery::FindByIdentifier { table: "tt_content" }).is_skip());

    let stats = run.finish();
    assert_eq!(stats.repository.function_count("find_properties_by_property"), 2);
    assert!(stats.skip.is_empty());
}

#[test]
fn test_finish_collects_both_counters() {
    let (local, foreign) = connections();
    let mut run = SyncRun::new(SyncConfig::default(), &local, &foreign);
    run.find_on_both_sides("uid", vec![1, 2], &FindOptions::for_table("pages"))
        .expect("lookup pages");
    run.find_on_both_sides("pid", 0, &FindOptions::for_table("tt_content"))
        .expect("lookup content");

    let stats = run.finish();
    assert_eq!(stats.repository.table_count("pages"), 2);
    assert_eq!(stats.repository.table_count("tt_content"), 0);
    assert_eq!(stats.skip.query_count("pages"), 1);
    assert_eq!(stats.skip.skip_count("tt_content"), 1);
}
