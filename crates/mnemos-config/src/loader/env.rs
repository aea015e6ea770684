//! `MNEMOS_*` environment variable overrides.

use super::{ConfigLayer, ConfigLayerSource, LoadedLayer, SchemaMode, layer_io, schema};
use crate::ConfigError;
use serde_json::{Map, Value};

/// How an environment value is decoded before it is placed in the layer.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    String,
    Integer,
    Bool,
}

/// Supported variables and the config path each one overrides.
const ENV_OVERRIDES: &[(&str, &[&str], EnvKind)] = &[
    ("MNEMOS_MEMORY_ROOT", &["memory", "root"], EnvKind::String),
    ("MNEMOS_NAMESPACE", &["memory", "namespace"], EnvKind::String),
    ("MNEMOS_EMBEDDER_PROVIDER", &["embedder", "provider"], EnvKind::String),
    ("MNEMOS_EMBEDDER_MODEL", &["embedder", "model"], EnvKind::String),
    ("MNEMOS_EMBEDDER_BASE_URL", &["embedder", "base_url"], EnvKind::String),
    ("MNEMOS_SYNTHESIS_PROVIDER", &["synthesis", "provider"], EnvKind::String),
    ("MNEMOS_SYNTHESIS_MODEL", &["synthesis", "model"], EnvKind::String),
    ("MNEMOS_SYNTHESIS_BASE_URL", &["synthesis", "base_url"], EnvKind::String),
    (
        "MNEMOS_CONSOLIDATION_THRESHOLD",
        &["consolidation", "threshold"],
        EnvKind::Integer,
    ),
    (
        "MNEMOS_CONSOLIDATION_INTERVAL_SECS",
        &["consolidation", "interval_secs"],
        EnvKind::Integer,
    ),
    (
        "MNEMOS_CONSOLIDATION_BACKGROUND",
        &["consolidation", "background"],
        EnvKind::Bool,
    ),
];

/// Build an override layer from environment variables, or `None` when no
/// recognised variable is set.
pub(super) fn env_layer(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Option<LoadedLayer>, ConfigError> {
    let mut root = Value::Object(Map::new());
    let mut found = false;

    for (key, raw) in vars {
        let Some((name, path, kind)) = ENV_OVERRIDES.iter().find(|(name, _, _)| *name == key)
        else {
            continue;
        };
        let value = decode(name, raw.trim(), *kind)?;
        insert_path(&mut root, path, value);
        found = true;
    }

    if !found {
        return Ok(None);
    }

    let label = layer_io::layer_label(ConfigLayerSource::Env, None);
    schema::validate_layer_schema(&root, SchemaMode::Partial, &label)?;
    Ok(Some(LoadedLayer {
        meta: ConfigLayer {
            source: ConfigLayerSource::Env,
            path: None,
        },
        value: root,
    }))
}

fn decode(name: &str, raw: &str, kind: EnvKind) -> Result<Value, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidField {
        path: format!("env:{name}"),
        message: message.to_string(),
    };
    match kind {
        EnvKind::String => Ok(Value::String(raw.to_string())),
        EnvKind::Integer => raw
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid("expected integer")),
        EnvKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(invalid("expected bool")),
        },
    }
}

fn insert_path(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for key in parents {
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }
}
