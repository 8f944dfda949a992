//! Layer merging
//!
//! Tables merge key by key. Anything else in a later layer, arrays and
//! explicit nulls included, replaces what came before.

use serde_json::Value;

/// Merge `overlay` onto `base`, returning the combined value
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

/// Fold layers lowest-precedence first
pub fn merge_layers(layers: Vec<Value>) -> Value {
    let mut merged = Value::Null;
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

fn merge_into(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
