//! Tests for layered configuration loading.

use super::*;
use crate::{EmbedderProviderKind, SynthesisProviderKind};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Options rooted at `cwd` with every default location switched off.
fn isolated_options(cwd: &Path) -> LayeredConfigOptions {
    let mut options = LayeredConfigOptions::new(cwd).without_env();
    options.system_config_path = None;
    options.user_config_path = None;
    options.requirements_path = None;
    options
}

#[test]
fn parse_minimal_config() {
    let config = MnemosConfig::load_from_str("{}").expect("config");
    assert_eq!(config.memory.namespace, "daemon");
    assert_eq!(config.embedder.provider, EmbedderProviderKind::Hashing);
    assert_eq!(config.synthesis.provider, SynthesisProviderKind::None);
    assert_eq!(config.consolidation.threshold, 10);
    assert_eq!(config.consolidation.store_cooldown_secs, 600);
    assert_eq!(config.consolidation.background_cooldown_secs, 1800);
    assert_eq!(config.consolidation.interval_secs, 300);
    assert_eq!(config.context.history_window, 3);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = MnemosConfig::load_from_str("{ unexpected: true }").unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_unknown_provider() {
    let err = MnemosConfig::load_from_str(r#"{ embedder: { provider: "faiss" } }"#).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("embedder.provider"), "{msg}");
}

#[test]
fn rejects_negative_threshold() {
    let err = MnemosConfig::load_from_str("{ consolidation: { threshold: -1 } }").unwrap_err();
    assert!(format!("{err}").contains("consolidation.threshold"));
}

#[test]
fn validate_rejects_max_fragments_below_min_batch() {
    let err = MnemosConfig::load_from_str(
        "{ consolidation: { min_batch: 5, max_fragments: 2 } }",
    )
    .unwrap_err();
    assert!(format!("{err}").contains("max_fragments"));
}

#[test]
fn validate_rejects_out_of_range_relevance_floor() {
    let err = MnemosConfig::load_from_str("{ context: { relevance_floor: 1.5 } }").unwrap_err();
    assert!(format!("{err}").contains("context.relevance_floor"));
}

#[test]
fn layered_config_prefers_repo_over_cwd() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ memory: { namespace: \"system\" } }");
    let user_config = root.join("user.json5");
    write_json5(&user_config, "{ memory: { namespace: \"user\" } }");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ memory: { namespace: \"project\" } }",
    );
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ memory: { namespace: \"cwd\" } }",
    );
    write_json5(
        &project_root
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE),
        "{ memory: { namespace: \"repo\" } }",
    );

    let mut options = isolated_options(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);

    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.memory.namespace, "repo");
    assert_eq!(layered.layers.len(), 5);
}

#[test]
fn layers_merge_sections_independently() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();

    let system_config = root.join("system.json5");
    write_json5(
        &system_config,
        "{ consolidation: { threshold: 4, interval_secs: 60 } }",
    );
    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, "{ consolidation: { threshold: 6 } }");

    let mut options = isolated_options(root).with_runtime_path(&runtime_config);
    options.system_config_path = Some(system_config);

    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.consolidation.threshold, 6);
    assert_eq!(layered.config.consolidation.interval_secs, 60);
}

#[test]
fn requirements_lock_overrides() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ synthesis: { model: \"system\" } }");
    let requirements = root.join("requirements.json5");
    write_json5(&requirements, "{ synthesis: { model: \"locked\" } }");
    let runtime_config = root.join("runtime.json5");
    write_json5(
        &runtime_config,
        "{ synthesis: { model: \"runtime\", timeout_secs: 9 } }",
    );

    let mut options = isolated_options(root);
    options.system_config_path = Some(system_config);
    options.requirements_path = Some(requirements);
    options.runtime_paths = vec![runtime_config];

    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.synthesis.model, "locked");
    assert_eq!(layered.config.synthesis.timeout_secs, 9);
}

#[test]
fn runtime_override_wins_without_constraints() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ embedder: { model: \"system\" } }");
    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, "{ embedder: { model: \"runtime\" } }");

    let mut options = isolated_options(root);
    options.system_config_path = Some(system_config);
    options.runtime_paths = vec![runtime_config];

    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.embedder.model, "runtime");
}

#[test]
fn invalid_layer_reports_its_label() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, "{ context: { max_items: \"five\" } }");

    let options = isolated_options(root).with_runtime_path(&runtime_config);
    let err = MnemosConfig::load_layered_with_options(options).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("runtime("), "{msg}");
    assert!(msg.contains("context.max_items"), "{msg}");
}

#[test]
fn malformed_layer_names_the_file() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let cwd_config = root.join(DEFAULT_CONFIG_FILE);
    write_json5(&cwd_config, "{ memory: { namespace: ");

    let err = MnemosConfig::load_layered_with_options(isolated_options(root)).unwrap_err();
    match err {
        ConfigError::ParseFailed { layer, .. } => {
            assert!(layer.starts_with("cwd("), "{layer}");
            assert!(layer.ends_with("mnemos.json5)"), "{layer}");
        }
        other => panic!("expected parse failure, got {other:?}"),
    }
}

#[test]
fn missing_runtime_layer_reports_its_path() {
    let temp = TempDir::new().expect("tmp");
    let missing = temp.path().join("absent.json5");

    let options = isolated_options(temp.path()).with_runtime_path(&missing);
    let err = MnemosConfig::load_layered_with_options(options).unwrap_err();
    match err {
        ConfigError::ReadFailed { path, .. } => assert_eq!(path, missing),
        other => panic!("expected read failure, got {other:?}"),
    }
}

#[test]
fn builder_replaces_sections() {
    let config = MnemosConfig::builder()
        .consolidation(crate::ConsolidationConfig {
            threshold: 3,
            ..Default::default()
        })
        .build();
    assert_eq!(config.consolidation.threshold, 3);
    config.validate().expect("valid");
}
