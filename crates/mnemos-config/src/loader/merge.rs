//! JSON merge helpers for layered configuration.

use serde_json::Value;

/// Overlay `overlay` onto `base`: objects merge key by key, every other value
/// (arrays included) replaces what was there.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    merge_json_with_constraints(base, overlay, None);
}

/// Overlay `overlay` onto `base`, skipping any leaf that `constraints` pins.
///
/// A constraint object descends alongside the overlay; a non-object constraint
/// locks the whole subtree beneath its key.
pub(super) fn merge_json_with_constraints(
    base: &mut Value,
    overlay: &Value,
    constraints: Option<&Value>,
) {
    let Value::Object(overlay_map) = overlay else {
        if constraints.is_none() {
            *base = overlay.clone();
        }
        return;
    };
    let Value::Object(base_map) = base else {
        if constraints.is_none() {
            *base = overlay.clone();
        }
        return;
    };
    let constraint_map = match constraints {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return,
    };

    for (key, value) in overlay_map {
        let key_constraint = constraint_map.and_then(|map| map.get(key));
        if matches!(key_constraint, Some(pinned) if !pinned.is_object()) {
            continue;
        }
        match base_map.get_mut(key) {
            Some(existing) => merge_json_with_constraints(existing, value, key_constraint),
            None if key_constraint.is_none() => {
                base_map.insert(key.clone(), value.clone());
            }
            None => {
                let mut fresh = Value::Object(serde_json::Map::new());
                merge_json_with_constraints(&mut fresh, value, key_constraint);
                base_map.insert(key.clone(), fresh);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_json_values, merge_json_with_constraints};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_and_scalars_replace() {
        let mut base = json!({ "consolidation": { "threshold": 10, "min_batch": 3 } });
        merge_json_values(&mut base, &json!({ "consolidation": { "threshold": 4 } }));
        assert_eq!(
            base,
            json!({ "consolidation": { "threshold": 4, "min_batch": 3 } })
        );
    }

    #[test]
    fn pinned_keys_survive_overrides() {
        let constraints = json!({ "synthesis": { "model": "locked" } });
        let mut base = constraints.clone();
        merge_json_with_constraints(
            &mut base,
            &json!({ "synthesis": { "model": "other", "timeout_secs": 5 } }),
            Some(&constraints),
        );
        assert_eq!(
            base,
            json!({ "synthesis": { "model": "locked", "timeout_secs": 5 } })
        );
    }
}
