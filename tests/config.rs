use std::fs;

use assert_matches::assert_matches;

use icon_export::config::{ConfigLoader, Overrides};
use icon_export::domain::{DuplicatePolicy, SourceSelection};
use icon_export::error::ExportError;

fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("icon-export.json");
    fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn load_reads_optional_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "url": "https://www.figma.com/design/AbC123/Icons",
            "version": "7",
            "canvas": "Glyphs",
            "output": "assets/icons",
            "concurrency": 3,
            "request_timeout_secs": 5,
            "duplicates": "fail"
        }"#,
    );

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.version.as_deref(), Some("7"));
    assert_eq!(config.concurrency, Some(3));
    assert_eq!(config.duplicates, Some(DuplicatePolicy::Fail));

    let resolved = ConfigLoader::resolve_with(config, Overrides::default(), |key| {
        (key == "TOKEN").then(|| "secret".to_string())
    })
    .unwrap();
    assert_eq!(resolved.canvas, "Glyphs");
    assert_eq!(resolved.output.as_str(), "assets/icons");
    assert_eq!(resolved.http.timeout.as_secs(), 5);
    assert_matches!(
        resolved.selection,
        SourceSelection::Primary { file_key, .. } if file_key.as_str() == "AbC123"
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let result = ConfigLoader::load(path.to_str());
    assert_matches!(result, Err(ExportError::ConfigRead(_)));
}

#[test]
fn missing_url_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "version": "1" }"#);
    let result = ConfigLoader::load(Some(&path));
    assert_matches!(result, Err(ExportError::ConfigParse(_)));
}

#[test]
fn unknown_duplicate_policy_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "url": "x", "duplicates": "merge" }"#);
    let result = ConfigLoader::load(Some(&path));
    assert_matches!(result, Err(ExportError::ConfigParse(_)));
}
