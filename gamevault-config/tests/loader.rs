use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use gamevault_config::loader::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, IGDB_CLIENT_ID_ENV, IGDB_CLIENT_SECRET_ENV, ROOTS_ENV,
};
use gamevault_config::{ConfigLoader, ConfigSource, ConfigWarning, validate};
use gamevault_core::types::ProviderKind;

fn loader_with(base: &std::path::Path, vars: &[(&str, &str)]) -> ConfigLoader {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    ConfigLoader::new()
        .with_base_dir(base)
        .with_lookup(move |key| vars.get(key).cloned())
}

#[test]
fn defaults_when_nothing_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let load = loader_with(dir.path(), &[]).load().unwrap();

    assert_eq!(load.source, ConfigSource::Default);
    assert!(load.config.roots.is_empty());
    assert_eq!(load.config.watch.debounce_secs, 30);
    assert_eq!(load.config.manifest.max_concurrent_hashes, 10);
    assert_eq!(load.config.enrichment.authoritative, ProviderKind::Igdb);
}

#[test]
fn default_candidate_file_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    fs::write(
        dir.path().join("config").join("gamevault.toml"),
        r#"
roots = ["/srv/games"]

[scan]
max_concurrent_scans = 2

[enrichment]
workers = 8
authoritative = "steam"

[manifest]
exclude_patterns = [".git", "shadercache"]
"#,
    )
    .unwrap();

    let load = loader_with(dir.path(), &[]).load().unwrap();
    assert_eq!(
        load.source,
        ConfigSource::File(dir.path().join("config").join("gamevault.toml"))
    );
    assert_eq!(load.config.roots, vec![PathBuf::from("/srv/games")]);
    assert_eq!(load.config.scan.max_concurrent_scans, 2);
    assert_eq!(load.config.enrichment.workers, 8);
    assert_eq!(load.config.enrichment.authoritative, ProviderKind::Steam);
    assert_eq!(load.config.manifest.exclude_patterns.len(), 2);
    // Unspecified sections keep their defaults.
    assert_eq!(load.config.watch.debounce_secs, 30);
}

#[test]
fn env_path_beats_inline_json_and_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let candidate = dir.path().join("gamevault.toml");
    let custom = dir.path().join("custom.json");
    fs::write(&candidate, "[watch]\ndebounce_secs = 1\n").unwrap();
    fs::write(&custom, r#"{"watch":{"debounce_secs":7}}"#).unwrap();

    let load = loader_with(
        dir.path(),
        &[
            (CONFIG_PATH_ENV, "custom.json"),
            (CONFIG_JSON_ENV, r#"{"watch":{"debounce_secs":9}}"#),
        ],
    )
    .load()
    .unwrap();

    assert_eq!(load.source, ConfigSource::EnvPath(custom));
    assert_eq!(load.config.watch.debounce_secs, 7);
}

#[test]
fn inline_json_is_used_without_a_path() {
    let dir = tempfile::tempdir().unwrap();
    let inline = r#"{"enrichment":{"workers":3}}"#;
    let load = loader_with(dir.path(), &[(CONFIG_JSON_ENV, inline)])
        .load()
        .unwrap();
    assert_eq!(load.source, ConfigSource::EnvInline);
    assert_eq!(load.config.enrichment.workers, 3);
}

#[test]
fn explicit_path_wins_over_environment() {
    let dir = tempfile::tempdir().unwrap();
    let explicit = dir.path().join("cli.toml");
    fs::write(&explicit, "[scan]\nmax_concurrent_scans = 1\n").unwrap();

    let inline = r#"{"scan":{"max_concurrent_scans":9}}"#;
    let load = loader_with(dir.path(), &[(CONFIG_JSON_ENV, inline)])
        .with_path(Some(explicit.clone()))
        .load()
        .unwrap();
    assert_eq!(load.source, ConfigSource::Explicit(explicit));
    assert_eq!(load.config.scan.max_concurrent_scans, 1);
}

#[test]
fn credentials_and_roots_come_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let roots = std::env::join_paths(["/mnt/a", "/mnt/b"]).unwrap();
    let roots = roots.to_string_lossy().into_owned();

    let load = loader_with(
        dir.path(),
        &[
            (IGDB_CLIENT_ID_ENV, "client"),
            (IGDB_CLIENT_SECRET_ENV, "secret"),
            (ROOTS_ENV, roots.as_str()),
        ],
    )
    .load()
    .unwrap();

    assert!(load.config.providers.igdb.is_configured());
    assert_eq!(
        load.config.roots,
        vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]
    );
    assert_eq!(
        load.env_overrides,
        vec![IGDB_CLIENT_ID_ENV, IGDB_CLIENT_SECRET_ENV, ROOTS_ENV]
    );
    assert!(!format!("{:?}", load.config.providers.igdb).contains("secret\""));
}

#[test]
fn unreadable_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = loader_with(dir.path(), &[])
        .with_path(Some(dir.path().join("missing.toml")))
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn validation_flags_suspicious_settings() {
    let dir = tempfile::tempdir().unwrap();
    let load = loader_with(
        dir.path(),
        &[
            (
                CONFIG_JSON_ENV,
                r#"{"enrichment":{"workers":0},"providers":{"steam":{"enabled":false}}}"#,
            ),
            (IGDB_CLIENT_ID_ENV, "client-only"),
        ],
    )
    .load()
    .unwrap();

    let warnings = validate(&load.config);
    assert!(warnings.contains(&ConfigWarning::NoRoots));
    assert!(warnings.contains(&ConfigWarning::PartialIgdbCredentials));
    assert!(warnings.contains(&ConfigWarning::NoProviders));
    assert!(warnings.contains(&ConfigWarning::ZeroWorkers));

    let mut config = load.config;
    config.roots = vec![dir.path().to_path_buf(), dir.path().join("absent")];
    let warnings = validate(&config);
    assert!(!warnings.contains(&ConfigWarning::NoRoots));
    assert_eq!(
        warnings
            .iter()
            .filter(|warning| matches!(warning, ConfigWarning::MissingRoot(_)))
            .count(),
        1
    );
}
