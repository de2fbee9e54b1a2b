//! Validating webhook configuration model.
//!
//! Every struct keeps fields it does not know about in `extra`, so an object
//! read from the cluster survives a read-modify-replace cycle intact.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use domop_core::{ResultExt, WebhookSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ResourceId, ResourceKind};
use crate::error::{Error, Result};
use crate::hash::SHA256_ANNOTATION;

/// Name of the validating webhook configuration and of its single webhook.
pub const WEBHOOK_NAME: &str = "domop.validating.webhook";
/// Path the webhook service serves admission reviews on.
pub const WEBHOOK_PATH: &str = "/admission";
/// Label marking resources the operator created.
pub const CREATED_BY_OPERATOR_LABEL: &str = "domop.io/createdByOperator";

const ADMISSION_REVIEW_VERSION: &str = "v1";
const SIDE_EFFECTS_NONE: &str = "None";
const RULE_API_GROUP: &str = "domop.io";
const RULE_API_VERSION: &str = "v1";
const RULE_OPERATION: &str = "UPDATE";
const RULE_RESOURCE: &str = "domains";
const RULE_SCOPE: &str = "Namespaced";

/// Resource kind of validating webhook configurations.
pub fn validating_webhook_kind() -> ResourceKind {
    ResourceKind::new(
        "admissionregistration.k8s.io",
        "v1",
        "ValidatingWebhookConfiguration",
        "validatingwebhookconfigurations",
    )
}

fn default_api_version() -> String {
    validating_webhook_kind().api_version()
}

fn default_kind() -> String {
    validating_webhook_kind().kind
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A cluster-scoped set of validating webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatingWebhookConfiguration {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<ValidatingWebhook>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One admission webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatingWebhook {
    pub name: String,
    #[serde(default)]
    pub admission_review_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleWithOperations>,
    #[serde(default)]
    pub client_config: WebhookClientConfig,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// How the API server reaches the webhook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceReference>,
    /// Base64-encoded PEM bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// In-cluster service backing a webhook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Operations and resources a webhook intercepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleWithOperations {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub api_versions: Vec<String>,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ValidatingWebhookConfiguration {
    /// An empty configuration with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            webhooks: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Parse a configuration from a cluster object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResource`] if the object does not match the
    /// model.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_resource(default_kind(), e.to_string()))
    }

    /// Render as a cluster object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResource`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::invalid_resource(&self.kind, e.to_string()))
    }

    /// Name from metadata, empty when unset.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Identity in the cluster.
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::cluster_scoped(validating_webhook_kind(), self.name())
    }

    /// The first webhook, if any.
    pub fn first_webhook(&self) -> Option<&ValidatingWebhook> {
        self.webhooks.first()
    }

    /// Service namespace of the first webhook.
    pub fn service_namespace(&self) -> Option<&str> {
        self.first_webhook()?
            .client_config
            .service
            .as_ref()
            .map(|service| service.namespace.as_str())
    }

    /// CA bundle of the first webhook.
    pub fn ca_bundle(&self) -> Option<&str> {
        self.first_webhook()?.client_config.ca_bundle.as_deref()
    }

    /// Point the first webhook at `namespace` and install `ca_bundle`.
    ///
    /// Returns `false` when there is no webhook or it has no service
    /// reference, in which case nothing changes.
    pub fn set_service_target(&mut self, namespace: &str, ca_bundle: Option<String>) -> bool {
        let Some(webhook) = self.webhooks.first_mut() else {
            return false;
        };
        let Some(service) = webhook.client_config.service.as_mut() else {
            return false;
        };
        service.namespace = namespace.to_string();
        webhook.client_config.ca_bundle = ca_bundle;
        true
    }

    /// The stored content hash annotation.
    pub fn stored_hash(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(SHA256_ANNOTATION)
            .map(String::as_str)
    }
}

/// Parameters of the desired webhook configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookInputs {
    pub namespace: String,
    pub service_name: String,
    pub port: u16,
    /// Base64-encoded certificate.
    pub certificate_data: Option<String>,
}

impl WebhookInputs {
    /// Inputs for `namespace` with the default service.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::from(&WebhookSettings::default())
        }
    }

    /// Set the certificate data.
    #[must_use]
    pub fn with_certificate_data(mut self, certificate_data: impl Into<String>) -> Self {
        self.certificate_data = Some(certificate_data.into());
        self
    }

    /// CA bundle derived from the certificate data.
    pub fn ca_bundle(&self) -> Option<String> {
        self.certificate_data.as_deref().and_then(ca_bundle)
    }
}

impl From<&WebhookSettings> for WebhookInputs {
    fn from(settings: &WebhookSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            service_name: settings.service_name.clone(),
            port: settings.port,
            certificate_data: settings.certificate_data.clone(),
        }
    }
}

/// Normalize base64 certificate data into a CA bundle.
///
/// Data that is not valid base64 is logged and yields no bundle.
pub fn ca_bundle(certificate_data: &str) -> Option<String> {
    STANDARD
        .decode(certificate_data.trim())
        .map(|bytes| STANDARD.encode(bytes))
        .into_option_logged()
}

/// Build the desired webhook configuration.
///
/// The content hash annotation is not set here; see
/// [`crate::hash::with_content_hash`].
pub fn desired_webhook_configuration(inputs: &WebhookInputs) -> ValidatingWebhookConfiguration {
    let mut configuration = ValidatingWebhookConfiguration::named(WEBHOOK_NAME);
    configuration
        .metadata
        .labels
        .insert(CREATED_BY_OPERATOR_LABEL.to_string(), "true".to_string());
    configuration.webhooks.push(ValidatingWebhook {
        name: WEBHOOK_NAME.to_string(),
        admission_review_versions: vec![ADMISSION_REVIEW_VERSION.to_string()],
        side_effects: Some(SIDE_EFFECTS_NONE.to_string()),
        rules: vec![RuleWithOperations {
            api_groups: vec![RULE_API_GROUP.to_string()],
            api_versions: vec![RULE_API_VERSION.to_string()],
            operations: vec![RULE_OPERATION.to_string()],
            resources: vec![RULE_RESOURCE.to_string()],
            scope: Some(RULE_SCOPE.to_string()),
            extra: BTreeMap::new(),
        }],
        client_config: WebhookClientConfig {
            service: Some(ServiceReference {
                namespace: inputs.namespace.clone(),
                name: inputs.service_name.clone(),
                port: Some(inputs.port),
                path: Some(WEBHOOK_PATH.to_string()),
                extra: BTreeMap::new(),
            }),
            ca_bundle: inputs.ca_bundle(),
            extra: BTreeMap::new(),
        },
        extra: BTreeMap::new(),
    });
    configuration
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_desired_configuration_shape() {
        let inputs = WebhookInputs::new("ns-a").with_certificate_data("Y2VydA==");

        let configuration = desired_webhook_configuration(&inputs);
        let value = configuration.to_value().unwrap();

        assert_eq!(value["apiVersion"], "admissionregistration.k8s.io/v1");
        assert_eq!(value["kind"], "ValidatingWebhookConfiguration");
        assert_eq!(value["metadata"]["name"], WEBHOOK_NAME);
        assert_eq!(value["metadata"]["labels"][CREATED_BY_OPERATOR_LABEL], "true");

        let webhook = &value["webhooks"][0];
        assert_eq!(webhook["name"], WEBHOOK_NAME);
        assert_eq!(webhook["admissionReviewVersions"], json!(["v1"]));
        assert_eq!(webhook["sideEffects"], "None");
        assert_eq!(
            webhook["rules"][0],
            json!({
                "apiGroups": ["domop.io"],
                "apiVersions": ["v1"],
                "operations": ["UPDATE"],
                "resources": ["domains"],
                "scope": "Namespaced"
            })
        );
        assert_eq!(
            webhook["clientConfig"]["service"],
            json!({
                "namespace": "ns-a",
                "name": "domop-webhook-svc",
                "port": 8084,
                "path": "/admission"
            })
        );
        assert_eq!(webhook["clientConfig"]["caBundle"], "Y2VydA==");
    }

    #[test]
    fn test_ca_bundle_normalizes_and_rejects() {
        assert_eq!(ca_bundle(" Y2VydA==\n"), Some("Y2VydA==".to_string()));
        assert_eq!(ca_bundle("not base64!"), None);
        assert_eq!(WebhookInputs::new("ns").ca_bundle(), None);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let value = json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": WEBHOOK_NAME, "generation": 4},
            "webhooks": [{
                "name": WEBHOOK_NAME,
                "admissionReviewVersions": ["v1"],
                "timeoutSeconds": 7,
                "clientConfig": {"service": {"namespace": "ns-a", "name": "svc"}}
            }]
        });

        let configuration = ValidatingWebhookConfiguration::from_value(value.clone()).unwrap();

        assert_eq!(configuration.to_value().unwrap(), value);
    }

    #[test]
    fn test_set_service_target() {
        let mut configuration = desired_webhook_configuration(&WebhookInputs::new("ns-a"));

        assert!(configuration.set_service_target("ns-b", Some("abc=".to_string())));
        assert_eq!(configuration.service_namespace(), Some("ns-b"));
        assert_eq!(configuration.ca_bundle(), Some("abc="));

        let mut empty = ValidatingWebhookConfiguration::named("x");
        assert!(!empty.set_service_target("ns-b", None));
        assert_eq!(empty.service_namespace(), None);
    }

    #[test]
    fn test_inputs_from_settings() {
        let settings = WebhookSettings {
            namespace: "ops".to_string(),
            port: 9443,
            ..WebhookSettings::default()
        };

        let inputs = WebhookInputs::from(&settings);

        assert_eq!(inputs.namespace, "ops");
        assert_eq!(inputs.port, 9443);
        assert_eq!(inputs.service_name, "domop-webhook-svc");
    }
}
