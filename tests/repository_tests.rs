use contentsync::{
    BaseRepository, ContentSyncError, ExecutionContext, FilterValue, FindOptions, IndexedRows,
    Side, SqlValue, SqliteConnection, SyncConfig, TableConfig,
};

const PAGES: &str = "
    CREATE TABLE pages (
        uid INTEGER PRIMARY KEY,
        pid INTEGER NOT NULL DEFAULT 0,
        title TEXT,
        sorting INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0,
        doktype INTEGER
    );
    INSERT INTO pages (uid, pid, title, sorting, deleted, doktype) VALUES
        (1, 0, 'Root', 10, 0, 1),
        (2, 1, 'About', 30, 0, NULL),
        (3, 1, 'Contact', 20, 0, NULL),
        (4, 1, 'Archive', 40, 1, NULL),
        (5, 2, 'Team', 10, 0, 254);
";

fn connection(ctx: &mut ExecutionContext) -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory(ctx.issue_handle(Side::Local))
        .expect("open in-memory sqlite")
        .with_restriction("deleted = 0");
    conn.execute_batch(PAGES).expect("seed pages");
    conn
}

fn repository() -> BaseRepository<SyncConfig> {
    let config = SyncConfig::default().with_table(
        "pages",
        TableConfig {
            sortby: Some("sorting".to_string()),
            ..TableConfig::default()
        },
    );
    BaseRepository::new(config)
}

fn keys(rows: &IndexedRows) -> Vec<&str> {
    rows.keys().collect()
}

#[test]
fn test_find_by_integer_sorts_by_default_field_and_ignores_restrictions() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_property(&conn, "pid", 1, &FindOptions::for_table("pages"))
        .expect("find by pid");
    assert_eq!(keys(&rows), vec!["3", "2", "4"]);
    assert_eq!(
        rows.get("3").and_then(|row| row.get("title")),
        Some(&SqlValue::Text("Contact".into()))
    );

    let by_string = repo
        .find_properties_by_property(&conn, "pid", "1", &FindOptions::for_table("pages"))
        .expect("find by integer-like string");
    assert_eq!(by_string, rows);
}

#[test]
fn test_find_by_pattern_uses_like() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_property(&conn, "title", "Con%", &FindOptions::for_table("pages"))
        .expect("find by title pattern");
    assert_eq!(keys(&rows), vec!["3"]);
}

#[test]
fn test_find_by_list_uses_in() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_property(&conn, "uid", vec![2, 5], &FindOptions::for_table("pages"))
        .expect("find by uid list");
    assert_eq!(keys(&rows), vec!["5", "2"]);

    let none = repo
        .find_properties_by_property(
            &conn,
            "uid",
            Vec::<i64>::new(),
            &FindOptions::for_table("pages"),
        )
        .expect("find by empty list");
    assert!(none.is_empty());
}

#[test]
fn test_order_by_embedded_in_where_overrides_order_by() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let options = FindOptions::for_table("pages")
        .with_where("AND deleted = 0 ORDER BY title DESC")
        .order_by("sorting ASC");
    let rows = repo
        .find_properties_by_property(&conn, "pid", 1, &options)
        .expect("find with embedded order");
    assert_eq!(keys(&rows), vec!["3", "2"]);
}

#[test]
fn test_order_by_applies_every_term() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let options = FindOptions::for_table("pages").order_by("pid DESC, sorting ASC");
    let rows = repo
        .find_properties_by_property(&conn, "deleted", 0, &options)
        .expect("find with multi-column order");
    assert_eq!(keys(&rows), vec!["5", "3", "2", "1"]);
}

#[test]
fn test_limit_is_applied_after_sorting() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_property(&conn, "pid", 1, &FindOptions::for_table("pages").limit(2))
        .expect("find with limit");
    assert_eq!(keys(&rows), vec!["3", "2"]);
}

#[test]
fn test_group_by_and_custom_index_field() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let options = FindOptions::for_table("pages")
        .group_by("pid")
        .index_field("pid");
    let rows = repo
        .find_properties_by_property(&conn, "deleted", 0, &options)
        .expect("find grouped");
    assert_eq!(rows.len(), 3);
    for pid in ["0", "1", "2"] {
        assert!(rows.contains_key(pid), "missing group {pid}");
    }
}

#[test]
fn test_combined_index_field() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let options = FindOptions::for_table("pages").index_field("pid,uid");
    let rows = repo
        .find_properties_by_property(&conn, "pid", 1, &options)
        .expect("find with combined index");
    assert_eq!(keys(&rows), vec!["1,3", "1,2", "1,4"]);
}

#[test]
fn test_find_by_properties_ands_all_filters() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_properties(
            &conn,
            &[("pid", FilterValue::from(1)), ("title", FilterValue::from("A%"))],
            &FindOptions::for_table("pages"),
        )
        .expect("find by two properties");
    assert_eq!(keys(&rows), vec!["2", "4"]);

    let untyped = repo
        .find_properties_by_properties(
            &conn,
            &[("pid", FilterValue::from(1)), ("doktype", FilterValue::Null)],
            &FindOptions::for_table("pages"),
        )
        .expect("find by null property");
    assert_eq!(keys(&untyped), vec!["3", "2", "4"]);
}

#[test]
fn test_empty_table_name_returns_nothing_without_querying() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let rows = repo
        .find_properties_by_property(&conn, "pid", 1, &FindOptions::for_table(""))
        .expect("empty table name");
    assert!(rows.is_empty());
    assert!(repo.statistics().is_empty());
}

#[test]
fn test_query_failure_is_returned() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    let err = repo
        .find_properties_by_property(&conn, "pid", 1, &FindOptions::for_table("missing"))
        .expect_err("missing table");
    assert!(matches!(err, ContentSyncError::QueryError(_)));
}

#[test]
fn test_statistics_count_calls_per_function_and_table() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    for pid in [0, 1] {
        repo.find_properties_by_property(&conn, "pid", pid, &FindOptions::for_table("pages"))
            .expect("find by pid");
    }
    repo.find_all(&conn, "pages").expect("find all");

    assert_eq!(repo.statistics().function_count("find_properties_by_property"), 2);
    assert_eq!(repo.statistics().function_count("find_all"), 1);
    assert_eq!(repo.statistics().table_count("pages"), 3);

    let drained = repo.drain_statistics();
    assert_eq!(drained.table_count("pages"), 3);
    assert!(repo.statistics().is_empty());
}

#[test]
fn test_find_all_ignores_restrictions() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();
    assert_eq!(repo.find_all(&conn, "pages").expect("find all").len(), 5);
}

#[test]
#[allow(deprecated)]
fn test_repository_wide_table_name_fallback() {
    let mut ctx = ExecutionContext::new();
    let conn = connection(&mut ctx);
    let mut repo = repository();

    assert_eq!(repo.identifier_field_name(), "uid");
    repo.set_table_name("pages");
    assert_eq!(repo.table_name(), "pages");

    let rows = repo
        .find_properties_by_property(&conn, "pid", 2, &FindOptions::default())
        .expect("find with fallback table");
    assert_eq!(keys(&rows), vec!["5"]);

    assert_eq!(repo.replace_table_name(""), "pages");
    let rows = repo
        .find_properties_by_property(&conn, "pid", 2, &FindOptions::default())
        .expect("find without table");
    assert!(rows.is_empty());
}
