use std::io::Write;

use contentsync::{ContentSyncError, SchemaProvider, SyncConfig, TableConfig};
use pretty_assertions::assert_eq;

const CONFIG: &str = r#"
[factory]
preload = ["sys_language", "be_groups"]

[features.skip_empty_tables]
enable = false

[tables.tt_content]
sortby = "sorting"
crdate = "crdate"

[tables.sys_file]
crdate = "creation_date"

[tables.tx_links]
compound_key = ["link_from", "link_to"]
"#;

#[test]
fn test_parse_full_config() -> Result<(), ContentSyncError> {
    let config = SyncConfig::from_toml_str(CONFIG)?;
    assert_eq!(config.preload_tables(), vec!["sys_language", "be_groups"]);
    assert!(!config.skip_empty_tables_enabled());
    assert_eq!(config.sorting_field("tt_content"), Some("sorting".to_string()));
    assert_eq!(config.sorting_field("sys_file"), Some("creation_date".to_string()));
    assert_eq!(config.sorting_field("pages"), None);
    assert_eq!(config.compound_key_columns("tx_links"), vec!["link_from", "link_to"]);
    Ok(())
}

#[test]
fn test_defaults() -> Result<(), ContentSyncError> {
    let config = SyncConfig::from_toml_str("")?;
    assert_eq!(config, SyncConfig::default());
    assert!(config.skip_empty_tables_enabled());
    assert!(config.preload_tables().is_empty());
    assert_eq!(
        config.compound_key_columns("sys_category_record_mm"),
        vec!["uid_local", "uid_foreign"]
    );
    Ok(())
}

#[test]
fn test_empty_sortby_falls_back_to_crdate() {
    let config = SyncConfig::default().with_table(
        "pages",
        TableConfig {
            sortby: Some(String::new()),
            crdate: Some("crdate".to_string()),
            ..TableConfig::default()
        },
    );
    assert_eq!(config.sorting_field("pages"), Some("crdate".to_string()));
}

#[test]
fn test_invalid_config_is_rejected() {
    for source in [
        "[factory]\npreload = \"pages\"",
        "[factory]\npreload = [\"\"]",
        "[tables.tx_links]\ncompound_key = []",
        "[tables.tx_links]\ncompound_key = [\"a\", \" \"]",
        "not toml at all",
    ] {
        let err = SyncConfig::from_toml_str(source).expect_err(source);
        assert!(matches!(err, ContentSyncError::ConfigError(_)), "{source}: {err}");
    }
}

#[test]
fn test_load_from_file() -> Result<(), ContentSyncError> {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(CONFIG.as_bytes()).expect("write config");

    let config = SyncConfig::load(file.path())?;
    assert_eq!(config.factory.preload.len(), 2);
    assert_eq!(config.tables.len(), 3);

    let dir = tempfile::tempdir().expect("temp dir");
    let err = SyncConfig::load(dir.path().join("missing.toml")).expect_err("missing file");
    assert!(matches!(err, ContentSyncError::ConfigError(_)));
    Ok(())
}

#[test]
fn test_builder_round_trips_through_toml() -> Result<(), ContentSyncError> {
    let config = SyncConfig::default()
        .with_preload(&["sys_language"])
        .with_table(
            "pages",
            TableConfig {
                sortby: Some("sorting".to_string()),
                ..TableConfig::default()
            },
        );
    let rendered = toml::to_string(&config).expect("render toml");
    assert_eq!(SyncConfig::from_toml_str(&rendered)?, config);
    Ok(())
}
