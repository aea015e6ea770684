//! Schema validation helpers for Mnemos JSON5 configuration.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Expected JSON shape for a leaf field.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    String,
    OptionalString,
    Bool,
    Integer,
    OptionalInteger,
    Number,
    /// String restricted to the listed values.
    OneOf(&'static [&'static str]),
}

const MEMORY_FIELDS: &[(&str, FieldKind)] = &[
    ("root", FieldKind::OptionalString),
    ("namespace", FieldKind::String),
    ("recall_k", FieldKind::Integer),
    ("min_score", FieldKind::Number),
];

const EMBEDDER_FIELDS: &[(&str, FieldKind)] = &[
    ("provider", FieldKind::OneOf(&["hashing", "openai"])),
    ("model", FieldKind::String),
    ("dimension", FieldKind::Integer),
    ("base_url", FieldKind::OptionalString),
    ("api_key_env", FieldKind::String),
    ("timeout_secs", FieldKind::Integer),
    ("cache_capacity", FieldKind::Integer),
];

const SYNTHESIS_FIELDS: &[(&str, FieldKind)] = &[
    ("provider", FieldKind::OneOf(&["none", "openai"])),
    ("model", FieldKind::String),
    ("base_url", FieldKind::String),
    ("api_key_env", FieldKind::String),
    ("timeout_secs", FieldKind::Integer),
    ("temperature", FieldKind::Number),
    ("max_tokens", FieldKind::OptionalInteger),
    ("instruction", FieldKind::OptionalString),
];

const CONSOLIDATION_FIELDS: &[(&str, FieldKind)] = &[
    ("threshold", FieldKind::Integer),
    ("min_batch", FieldKind::Integer),
    ("max_fragments", FieldKind::Integer),
    ("store_cooldown_secs", FieldKind::Integer),
    ("background_cooldown_secs", FieldKind::Integer),
    ("interval_secs", FieldKind::Integer),
    ("shutdown_timeout_secs", FieldKind::Integer),
    ("background", FieldKind::Bool),
];

const CONTEXT_FIELDS: &[(&str, FieldKind)] = &[
    ("history_window", FieldKind::Integer),
    ("relevance_floor", FieldKind::Number),
    ("max_items", FieldKind::Integer),
    ("excerpt_chars", FieldKind::Integer),
];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let sections: [(&str, &[(&str, FieldKind)]); 5] = [
        ("memory", MEMORY_FIELDS),
        ("embedder", EMBEDDER_FIELDS),
        ("synthesis", SYNTHESIS_FIELDS),
        ("consolidation", CONSOLIDATION_FIELDS),
        ("context", CONTEXT_FIELDS),
    ];

    let mut allowed = vec!["$schema"];
    allowed.extend(sections.iter().map(|(name, _)| *name));
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    for (name, fields) in sections {
        if let Some(value) = map.get(name) {
            validate_section(value, fields, layer, name)?;
        }
    }
    Ok(())
}

/// Validate one top-level block against its field table.
fn validate_section(
    value: &Value,
    fields: &[(&str, FieldKind)],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let allowed: Vec<&str> = fields.iter().map(|(key, _)| *key).collect();
    ensure_allowed_keys(map, &allowed, layer, path)?;

    for (key, kind) in fields {
        if let Some(value) = map.get(*key) {
            validate_field(value, *kind, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate a leaf value against its expected kind.
fn validate_field(
    value: &Value,
    kind: FieldKind,
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match kind {
        FieldKind::String => expect_string(value, layer, path),
        FieldKind::OptionalString if value.is_null() => Ok(()),
        FieldKind::OptionalString => expect_string(value, layer, path),
        FieldKind::Bool => expect_bool(value, layer, path),
        FieldKind::Integer => expect_u64(value, layer, path),
        FieldKind::OptionalInteger if value.is_null() => Ok(()),
        FieldKind::OptionalInteger => expect_u64(value, layer, path),
        FieldKind::Number => expect_f64(value, layer, path),
        FieldKind::OneOf(options) => {
            let Some(raw) = value.as_str() else {
                return Err(invalid_field(layer, path, "expected string"));
            };
            if options.contains(&raw) {
                Ok(())
            } else {
                Err(invalid_field(
                    layer,
                    path,
                    &format!("expected one of: {}", options.join(", ")),
                ))
            }
        }
    }
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a JSON boolean or return a typed error.
fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if matches!(value, Value::Bool(_)) {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a JSON number or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
