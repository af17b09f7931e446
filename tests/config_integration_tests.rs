//! Integration tests for config loading from fixture files.

use std::fs;
use std::path::{Path, PathBuf};

use film_archive::archive::{ArchiveConfig, Config};

/// Read the sample config file content.
fn read_sample_config() -> String {
    let config_path = Path::new("tests/fixtures/sample_config.toml");
    fs::read_to_string(config_path).expect("Failed to read sample config file")
}

#[test]
fn sample_config_file_exists() {
    let config_path = Path::new("tests/fixtures/sample_config.toml");
    assert!(config_path.exists(), "Sample config file should exist");
}

#[test]
fn sample_config_is_valid_toml() {
    let config_content = read_sample_config();
    let result: Result<toml::Value, _> = toml::from_str(&config_content);
    assert!(result.is_ok(), "Sample config should be valid TOML: {:?}", result.err());
}

#[test]
fn archive_section_has_expected_structure() {
    let config_content = read_sample_config();
    let value: toml::Value = toml::from_str(&config_content).expect("should parse");

    let archive = value.get("archive").expect("should have archive section");

    for key in [
        "destination",
        "registry",
        "alternate_titles",
        "cache",
        "report",
        "batch_size",
        "extensions",
        "ignore_patterns",
        "folder_fuzzy_threshold",
        "file_fuzzy_threshold",
        "disambiguation",
        "ai",
    ] {
        assert!(archive.get(key).is_some(), "archive section should have {key}");
    }
}

#[test]
fn config_values_have_correct_types() {
    let config_content = read_sample_config();
    let value: toml::Value = toml::from_str(&config_content).expect("should parse");
    let archive = value.get("archive").expect("should have archive section");

    assert!(archive.get("verbose").unwrap().is_bool());
    assert!(archive.get("batch_size").unwrap().is_integer());
    assert!(archive.get("folder_fuzzy_threshold").unwrap().is_float());
    assert!(archive.get("registry").unwrap().is_str());
    assert!(archive.get("extensions").unwrap().is_array());
    assert!(archive.get("disambiguation").unwrap().is_array());
    assert!(archive.get("ai").unwrap().is_table());
}

#[test]
fn sample_config_parses_into_archive_config() {
    let config = ArchiveConfig::from_toml_str(&read_sample_config()).expect("should parse");

    assert_eq!(config.batch_size, Some(8));
    assert_eq!(config.registry, Some(PathBuf::from("~/Archives/films.xlsx")));
    assert_eq!(config.disambiguation.len(), 2);
    assert_eq!(config.disambiguation[0].film_id, "205");
    assert_eq!(config.disambiguation[0].keywords, vec!["1916", "Essanay"]);
    assert!(!config.ai.enabled);
    assert_eq!(config.ai.timeout_secs, 15);
    assert!(config.verbose);
}

#[test]
fn final_config_merges_defaults() {
    let user_config = ArchiveConfig::from_toml_str(&read_sample_config()).expect("should parse");
    let source = std::env::temp_dir().join("film-archive-source");
    let config = Config::from_user_config(source, user_config).expect("should build config");

    assert_eq!(config.batch_size, 8);
    assert!(config.extensions.contains(&"tif".to_string()));
    assert!(!config.extensions.contains(&"xlsx".to_string()));
    assert!(config.ignore_patterns.contains(&".DS_Store".to_string()));
    assert!(config.ignore_patterns.contains(&"~$".to_string()));
    assert!((config.file_fuzzy_threshold - 95.0).abs() < f64::EPSILON);
}

#[test]
fn empty_config_uses_defaults() {
    let user_config = ArchiveConfig::from_toml_str("").expect("should parse");
    let source = std::env::temp_dir().join("film-archive-source");
    let config = Config::from_user_config(source.clone(), user_config).expect("should build config");

    assert_eq!(config.batch_size, 10);
    assert_eq!(config.destination, source.parent().unwrap().join("Sorted"));
    assert!(config.extensions.contains(&"mp3".to_string()));
    assert!(config.disambiguation.is_empty());
}

#[test]
fn partial_ai_section_keeps_defaults() {
    let config = ArchiveConfig::from_toml_str(
        r#"
[archive.ai]
enabled = true
"#,
    )
    .expect("should parse");
    assert!(config.ai.enabled);
    assert_eq!(config.ai.model, "gpt-4o-mini");
    assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
}
