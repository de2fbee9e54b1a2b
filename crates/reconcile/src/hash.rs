//! SHA-256 content hashing of cluster objects.
//!
//! The hash covers what the operator controls and skips what the cluster
//! assigns, so a stored object and the desired model that produced it hash
//! the same. The hash annotation itself is excluded as well.

use itertools::Itertools;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::ValidatingWebhookConfiguration;

/// Annotation carrying the content hash.
pub const SHA256_ANNOTATION: &str = "domop.io/sha256";

/// Metadata fields assigned by the cluster.
const CLUSTER_ASSIGNED: [&str; 5] = [
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
];

/// Hash arbitrary bytes with SHA-256.
#[inline]
pub fn hash_input(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex content hash of a cluster object.
///
/// Object keys serialize in sorted order, so the hash does not depend on
/// field order.
///
/// # Examples
///
/// ```
/// use domop_reconcile::hash::content_hash;
/// use serde_json::json;
///
/// let desired = json!({"metadata": {"name": "a"}, "spec": {"x": 1}});
/// let stored = json!({"metadata": {"name": "a", "uid": "42"}, "spec": {"x": 1}});
/// assert_eq!(content_hash(&desired), content_hash(&stored));
/// ```
pub fn content_hash(value: &Value) -> String {
    let hashed = hashable_content(value);
    let bytes = hashed.to_string();
    hash_input(bytes.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .join("")
}

fn hashable_content(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in CLUSTER_ASSIGNED {
            metadata.remove(field);
        }
        let annotations_empty = metadata
            .get_mut("annotations")
            .and_then(Value::as_object_mut)
            .is_some_and(|annotations| {
                annotations.remove(SHA256_ANNOTATION);
                annotations.is_empty()
            });
        if annotations_empty {
            metadata.remove("annotations");
        }
    }
    value
}

/// The hash annotation stored on an object, if any.
pub fn stored_hash(value: &Value) -> Option<&str> {
    value
        .get("metadata")?
        .get("annotations")?
        .get(SHA256_ANNOTATION)?
        .as_str()
}

/// Whether the stored hash annotation matches the object's content.
pub fn has_current_hash(value: &Value) -> bool {
    stored_hash(value).is_some_and(|stored| stored == content_hash(value))
}

/// Attach the content hash annotation to a webhook configuration.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn with_content_hash(
    mut configuration: ValidatingWebhookConfiguration,
) -> Result<ValidatingWebhookConfiguration> {
    let hash = content_hash(&configuration.to_value()?);
    configuration
        .metadata
        .annotations
        .insert(SHA256_ANNOTATION.to_string(), hash);
    Ok(configuration)
}
