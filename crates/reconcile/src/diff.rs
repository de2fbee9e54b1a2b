//! Differences between two versions of a nested configuration model.
//!
//! Models are JSON objects. Key sets compare at the top level
//! ([`ModelDiff::added`] and friends); [`ModelDiff::changed_model`] walks into
//! nested objects and keeps only the leaves whose values changed, taking
//! their current values and rebuilding the nesting around them.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Top-level key whose presence makes a change unsafe to apply online.
pub const APP_DEPLOYMENTS: &str = "appDeployments";

/// Comparison of a current model against a past one.
#[derive(Debug, Clone)]
pub struct ModelDiff {
    current: Map<String, Value>,
    past: Map<String, Value>,
    changes: Vec<(Vec<String>, Value)>,
    added_paths: Vec<String>,
}

impl ModelDiff {
    /// Compare `current` against `past`.
    ///
    /// A value that is not a JSON object counts as an empty model.
    pub fn new(current: &Value, past: &Value) -> Self {
        let current = current.as_object().cloned().unwrap_or_default();
        let past = past.as_object().cloned().unwrap_or_default();
        let mut changes = Vec::new();
        let mut added_paths = Vec::new();
        walk(&current, &past, &mut Vec::new(), &mut changes, &mut added_paths);
        Self {
            current,
            past,
            changes,
            added_paths,
        }
    }

    /// Top-level keys only present in the current model.
    pub fn added(&self) -> BTreeSet<&str> {
        self.current
            .keys()
            .filter(|key| !self.past.contains_key(*key))
            .map(String::as_str)
            .collect()
    }

    /// Top-level keys only present in the past model.
    pub fn removed(&self) -> BTreeSet<&str> {
        self.past
            .keys()
            .filter(|key| !self.current.contains_key(*key))
            .map(String::as_str)
            .collect()
    }

    /// Top-level keys present in both models with different values.
    pub fn changed(&self) -> BTreeSet<&str> {
        self.shared_keys(false)
    }

    /// Top-level keys present in both models with equal values.
    pub fn unchanged(&self) -> BTreeSet<&str> {
        self.shared_keys(true)
    }

    fn shared_keys(&self, equal: bool) -> BTreeSet<&str> {
        self.current
            .iter()
            .filter(|(key, value)| {
                self.past
                    .get(*key)
                    .is_some_and(|past| (past == *value) == equal)
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Dotted paths of keys added below a changed top-level key.
    pub fn added_paths(&self) -> &[String] {
        &self.added_paths
    }

    /// Dotted paths of the changed leaves.
    pub fn changed_paths(&self) -> Vec<String> {
        self.changes.iter().map(|(path, _)| path.join(".")).collect()
    }

    /// The changed leaves with their current values, nested as in the
    /// current model.
    ///
    /// Added and removed keys are not part of the projection.
    pub fn changed_model(&self) -> Value {
        let mut model = Map::new();
        for (path, value) in &self.changes {
            insert_path(&mut model, path, value.clone());
        }
        Value::Object(model)
    }
}

fn walk(
    current: &Map<String, Value>,
    past: &Map<String, Value>,
    path: &mut Vec<String>,
    changes: &mut Vec<(Vec<String>, Value)>,
    added_paths: &mut Vec<String>,
) {
    for (key, current_value) in current {
        path.push(key.clone());
        match past.get(key) {
            None if path.len() > 1 => added_paths.push(path.join(".")),
            None => {}
            Some(past_value) if past_value == current_value => {}
            Some(past_value) => match (current_value.as_object(), past_value.as_object()) {
                (Some(current_child), Some(past_child)) => {
                    walk(current_child, past_child, path, changes, added_paths);
                }
                _ => changes.push((path.clone(), current_value.clone())),
            },
        }
        path.pop();
    }
}

fn insert_path(root: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let entry = node
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    node.insert(leaf.clone(), value);
}

/// Whether a changed model can be applied without a restart.
///
/// An empty model is unsafe, as is any model touching
/// [`APP_DEPLOYMENTS`].
pub fn is_safe_diff(model: &Value) -> bool {
    model
        .as_object()
        .is_some_and(|model| !model.is_empty() && !model.contains_key(APP_DEPLOYMENTS))
}
