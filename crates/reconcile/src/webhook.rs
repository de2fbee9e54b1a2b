//! Reconciler for the operator's validating webhook configuration.

use std::sync::Arc;
use std::time::Duration;

use domop_core::OperatorConfig;
use domop_work::{RetryPolicy, StepRef};
use tracing::debug;

use crate::client::{ClusterClient, ResourceId};
use crate::error::Result;
use crate::hash::with_content_hash;
use crate::model::{
    desired_webhook_configuration, validating_webhook_kind, ValidatingWebhookConfiguration,
    WebhookInputs, WEBHOOK_NAME,
};
use crate::singleton::{SingletonReconciler, SingletonResource};

impl SingletonResource for ValidatingWebhookConfiguration {
    fn resource_id(&self) -> ResourceId {
        ValidatingWebhookConfiguration::resource_id(self)
    }

    fn needs_update(&self, desired: &Self) -> bool {
        self.service_namespace() != desired.service_namespace()
    }

    fn merge_owned_fields(&mut self, desired: &Self) {
        let namespace = desired.service_namespace().unwrap_or_default();
        let ca_bundle = desired.ca_bundle().map(str::to_string);
        if !self.set_service_target(namespace, ca_bundle) {
            debug!(
                name = %self.name(),
                "First webhook has no service reference; submitting it unchanged"
            );
        }
    }
}

/// Keeps the validating webhook configuration pointed at the operator's
/// webhook service.
///
/// Missing permissions to manage the configuration are not an error: the
/// chain logs them and moves on.
pub struct WebhookReconciler {
    inner: SingletonReconciler<ValidatingWebhookConfiguration>,
}

impl WebhookReconciler {
    /// Create a reconciler issuing calls through `client`.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        policy: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: SingletonReconciler::new(client, policy, timeout)
                .tolerate_permission_denied(true),
        }
    }

    /// Create a reconciler with the retry policy and call deadline from
    /// `config`.
    pub fn from_config(client: Arc<dyn ClusterClient>, config: &OperatorConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::from(&config.retry),
            Some(Duration::from_millis(config.call_timeout_ms)),
        )
    }

    /// Build the reconcile chain, ending the fiber once converged.
    ///
    /// # Errors
    ///
    /// Returns an error if the desired configuration cannot be serialized
    /// for hashing.
    pub fn build_step_chain(
        &self,
        inputs: &WebhookInputs,
        conflict: Option<StepRef>,
    ) -> Result<StepRef> {
        self.build_step_chain_with_next(inputs, conflict, None)
    }

    /// Build the reconcile chain, continuing at `next` once converged.
    ///
    /// # Errors
    ///
    /// Returns an error if the desired configuration cannot be serialized
    /// for hashing.
    pub fn build_step_chain_with_next(
        &self,
        inputs: &WebhookInputs,
        conflict: Option<StepRef>,
        next: Option<StepRef>,
    ) -> Result<StepRef> {
        let desired = with_content_hash(desired_webhook_configuration(inputs))?;
        Ok(self.inner.build_step_chain(desired, conflict, next))
    }

    /// Build a chain removing the webhook configuration.
    pub fn build_delete_chain(&self, conflict: Option<StepRef>, next: Option<StepRef>) -> StepRef {
        let id = ResourceId::cluster_scoped(validating_webhook_kind(), WEBHOOK_NAME);
        self.inner.build_delete_chain(id, conflict, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_update_compares_service_namespace() {
        let current = desired_webhook_configuration(&WebhookInputs::new("ns-a"));
        let same = desired_webhook_configuration(
            &WebhookInputs::new("ns-a").with_certificate_data("Y2VydA=="),
        );
        let moved = desired_webhook_configuration(&WebhookInputs::new("ns-b"));

        assert!(!current.needs_update(&same));
        assert!(current.needs_update(&moved));
    }

    #[test]
    fn test_merge_overwrites_only_owned_fields() {
        let mut current = desired_webhook_configuration(&WebhookInputs::new("ns-a"));
        current.metadata.resource_version = Some("7".to_string());
        if let Some(service) = current.webhooks[0].client_config.service.as_mut() {
            service.port = Some(9443);
        }
        let desired = desired_webhook_configuration(
            &WebhookInputs::new("ns-b").with_certificate_data("Y2VydA=="),
        );

        current.merge_owned_fields(&desired);

        assert_eq!(current.service_namespace(), Some("ns-b"));
        assert_eq!(current.ca_bundle(), Some("Y2VydA=="));
        assert_eq!(current.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(
            current.webhooks[0].client_config.service.as_ref().and_then(|s| s.port),
            Some(9443)
        );
    }

    #[test]
    fn test_merge_leaves_webhooks_without_service_alone() {
        let mut empty = ValidatingWebhookConfiguration::named(WEBHOOK_NAME);
        let desired = desired_webhook_configuration(&WebhookInputs::new("ns-b"));

        empty.merge_owned_fields(&desired);
        assert!(empty.webhooks.is_empty());

        let mut url_based = desired_webhook_configuration(&WebhookInputs::new("ns-a"));
        url_based.webhooks[0].client_config.service = None;
        let before = url_based.clone();

        url_based.merge_owned_fields(&desired);
        assert_eq!(url_based, before);
    }
}
