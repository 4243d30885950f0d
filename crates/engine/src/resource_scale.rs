//! Resource-scale forms consulted when a task lands in
//! `ADJUSTING_RESOURCES`: how a requested resource value grows before the
//! next attempt. `resource_scales` travels the wire as a JSON object
//! (`{resource_name: spec}`), so a spec is one of three shapes rather than
//! an arbitrary closure — `Computed` is a name dispatched the same way
//! `distributor::driver_for_cluster` picks a `ClusterDriver` by name.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::hash::hash_pairs;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceScale {
    Constant(f64),
    Sequence(Vec<f64>),
    Computed(fn(f64) -> f64),
}

impl ResourceScale {
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(ResourceScale::Constant),
            Value::Array(items) => {
                let seq: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                if seq.is_empty() {
                    None
                } else {
                    Some(ResourceScale::Sequence(seq))
                }
            }
            Value::String(name) => named_formula(name).map(ResourceScale::Computed),
            _ => None,
        }
    }

    /// `step` is the zero-based count of adjustments already applied to
    /// this task — the index into a `Sequence`, or the input to
    /// `Computed`. A `Sequence` with nothing left at `step` leaves the
    /// value unscaled, mirroring Python's exhausted-iterator behavior.
    pub fn apply(&self, old: f64, step: usize) -> f64 {
        match self {
            ResourceScale::Constant(scale) => old * (1.0 + scale),
            ResourceScale::Sequence(values) => values.get(step).copied().unwrap_or(old),
            ResourceScale::Computed(f) => f(old),
        }
    }
}

fn named_formula(name: &str) -> Option<fn(f64) -> f64> {
    match name {
        "double" => Some(|old| old * 2.0),
        "sqrt_backoff" => Some(|old| old * old.max(1.0).sqrt()),
        _ => None,
    }
}

/// Apply `resource_scales` onto `requested_resources`, both JSON objects
/// keyed by resource name. A resource with no matching scale, or whose
/// current value isn't numeric, passes through unchanged.
pub fn scale_resources(requested_resources: &Value, resource_scales: &Value, step: usize) -> Value {
    let Some(resources) = requested_resources.as_object() else {
        return requested_resources.clone();
    };
    let scales = resource_scales.as_object();

    let mut scaled = Map::with_capacity(resources.len());
    for (key, value) in resources {
        let next = scales
            .and_then(|s| s.get(key))
            .and_then(ResourceScale::parse)
            .zip(value.as_f64())
            .and_then(|(scale, old)| serde_json::Number::from_f64(scale.apply(old, step)))
            .map(Value::Number)
            .unwrap_or_else(|| value.clone());
        scaled.insert(key.clone(), next);
    }
    Value::Object(scaled)
}

/// Content hash for a (possibly just-scaled) TaskResources row, the same
/// sorted-pairs-over-SHA-256 scheme every other dedup key in `engine::hash`
/// uses.
pub fn resources_hash(queue: &str, requested_resources: &Value) -> String {
    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    pairs.insert("queue".to_string(), queue.to_string());
    if let Some(obj) = requested_resources.as_object() {
        for (key, value) in obj {
            pairs.insert(format!("resource:{key}"), value.to_string());
        }
    }
    hash_pairs(&pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_scale_multiplies_by_one_plus_scale() {
        let scale = ResourceScale::Constant(0.5);
        assert_eq!(scale.apply(10.0, 0), 15.0);
    }

    #[test]
    fn sequence_scale_consumes_one_step_at_a_time() {
        let scale = ResourceScale::Sequence(vec![20.0, 40.0]);
        assert_eq!(scale.apply(10.0, 0), 20.0);
        assert_eq!(scale.apply(10.0, 1), 40.0);
    }

    #[test]
    fn exhausted_sequence_leaves_value_unscaled() {
        let scale = ResourceScale::Sequence(vec![20.0]);
        assert_eq!(scale.apply(10.0, 5), 10.0);
    }

    #[test]
    fn computed_scale_dispatches_by_name() {
        let scale = ResourceScale::parse(&Value::String("double".to_string())).unwrap();
        assert_eq!(scale.apply(4.0, 0), 8.0);
    }

    #[test]
    fn unknown_named_formula_does_not_parse() {
        assert!(ResourceScale::parse(&Value::String("not_a_formula".to_string())).is_none());
    }

    #[test]
    fn scale_resources_only_touches_keys_with_a_matching_scale() {
        let requested = serde_json::json!({"memory": 10.0, "cores": 2.0});
        let scales = serde_json::json!({"memory": 0.5});
        let scaled = scale_resources(&requested, &scales, 0);
        assert_eq!(scaled["memory"], 15.0);
        assert_eq!(scaled["cores"], 2.0);
    }

    #[test]
    fn resources_hash_changes_with_the_resource_values() {
        let a = serde_json::json!({"memory": 15.0});
        let b = serde_json::json!({"memory": 30.0});
        assert_ne!(resources_hash("null.q", &a), resources_hash("null.q", &b));
    }
}
