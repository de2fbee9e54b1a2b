//! Typed models of the cluster resources the operator manages.

pub mod webhook;

pub use webhook::{
    ca_bundle, desired_webhook_configuration, validating_webhook_kind, ObjectMeta,
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig, WebhookInputs, CREATED_BY_OPERATOR_LABEL, WEBHOOK_NAME, WEBHOOK_PATH,
};
