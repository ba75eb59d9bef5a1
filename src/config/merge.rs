//! Deep merge of configuration layers.
//!
//! Higher tiers override lower tiers field by field. Arrays are replaced
//! entirely, not concatenated.

use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// Objects merge recursively; any other overlay value replaces the base,
/// except `null`, which means "not specified" and keeps the base.
///
/// # Example
/// ```
/// use serde_json::json;
/// use task_tracker::config::deep_merge;
///
/// let base = json!({"server": {"port": 8000, "bind": "127.0.0.1"}});
/// let overlay = json!({"server": {"port": 9000}});
/// assert_eq!(
///     deep_merge(base, overlay),
///     json!({"server": {"port": 9000, "bind": "127.0.0.1"}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge layers in order, later layers winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_sections_merge() {
        let base = json!({
            "server": {"bind": "127.0.0.1", "port": 8000},
            "mail": {"from": "a@x"}
        });
        let overlay = json!({"server": {"port": 9000}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({
                "server": {"bind": "127.0.0.1", "port": 9000},
                "mail": {"from": "a@x"}
            })
        );
    }

    #[test]
    fn test_null_keeps_base() {
        let base = json!({"auth": {"secret_key": "k", "min_password_length": 8}});
        let overlay = json!({"auth": {"secret_key": null}});
        assert_eq!(deep_merge(base.clone(), overlay), base);
    }

    #[test]
    fn test_arrays_and_scalars_replace() {
        let base = json!({"list": [1, 2, 3], "value": {"nested": true}});
        let overlay = json!({"list": [4], "value": 42});
        assert_eq!(deep_merge(base, overlay), json!({"list": [4], "value": 42}));
    }

    #[test]
    fn test_merge_all_later_wins() {
        let layers = vec![
            json!({"tasks": {"default_page_size": 20, "max_page_size": 100}}),
            json!({"tasks": {"default_page_size": 10}}),
            json!({"tasks": {"default_page_size": 30}}),
        ];
        assert_eq!(
            deep_merge_all(layers),
            json!({"tasks": {"default_page_size": 30, "max_page_size": 100}})
        );
    }
}
