//! Defaulting of `KnativeServing` resources created or updated on OpenShift.
//!
//! Istio sidecars injected into Knative workloads must not intercept traffic to the cluster
//! network, so the outbound IP ranges are restricted unless the user configured them.
use std::{convert::Infallible, sync::Arc};

use k8s_openapi::{
    api::admissionregistration::v1::{
        MutatingWebhook as MutatingWebhookEntry, MutatingWebhookConfiguration, RuleWithOperations,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    Client,
    core::{
        DynamicObject,
        admission::{AdmissionRequest, AdmissionResponse},
    },
};
use serving_webhook::{
    admission::{self, BAD_REQUEST, DecodeError, Decoder, INTERNAL_SERVER_ERROR},
    webhooks::{MutatingWebhook, Webhook, create_webhook_client_config},
};
use snafu::{ResultExt, Snafu};

use crate::crd::{self, KnativeServing};

/// The path the webhook server serves this webhook at.
pub const WEBHOOK_PATH: &str = "/mutate-v1alpha1-knativeserving";

/// The config group holding the Istio network settings.
pub const NETWORK_CONFIG_GROUP: &str = "network";

/// The network setting restricting which outbound traffic passes the Istio sidecar.
pub const ISTIO_OUTBOUND_IP_RANGES_KEY: &str = "istio.sidecar.includeOutboundIPRanges";

/// The value set when the user did not configure [`ISTIO_OUTBOUND_IP_RANGES_KEY`].
pub const DEFAULT_ISTIO_OUTBOUND_IP_RANGES: &str = "10.0.0.1/24";

/// Name of both the generated `MutatingWebhookConfiguration` and the webhook entry inside it.
pub const WEBHOOK_CONFIGURATION_NAME: &str = "mutating.knativeserving.openshift.io";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode KnativeServing"))]
    DecodeKnativeServing { source: DecodeError },

    #[snafu(display("failed to apply defaults to KnativeServing"))]
    ApplyDefaults { source: Infallible },

    #[snafu(display("failed to serialize the mutated KnativeServing"))]
    SerializeKnativeServing { source: serde_json::Error },
}

impl Error {
    /// The HTTP status code reported to the API server.
    pub fn code(&self) -> u16 {
        match self {
            Self::DecodeKnativeServing { .. } | Self::ApplyDefaults { .. } => BAD_REQUEST,
            Self::SerializeKnativeServing { .. } => INTERNAL_SERVER_ERROR,
        }
    }
}

/// Applies OpenShift specific defaults to `KnativeServing` resources.
#[derive(Clone)]
pub struct KnativeServingConfigurator {
    decoder: Decoder,

    #[expect(
        dead_code,
        reason = "reserved for defaulting rules which need to look at the cluster"
    )]
    client: Option<Client>,
}

impl KnativeServingConfigurator {
    pub fn new(decoder: Decoder, client: Option<Client>) -> Self {
        Self { decoder, client }
    }

    /// Returns the mutating webhook serving this configurator at [`WEBHOOK_PATH`].
    pub fn into_webhook(self) -> Box<dyn Webhook> {
        let webhook: MutatingWebhook<_, _, DynamicObject> =
            MutatingWebhook::new(WEBHOOK_PATH, handle_admission, Arc::new(self));
        Box::new(webhook)
    }

    /// Mutates the object carried by `request` and returns the resulting patch.
    pub fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        match self.try_handle(request) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    admission.uid = request.uid.as_str(),
                    "rejecting admission request"
                );
                admission::errored(request, error.code(), &error)
            }
        }
    }

    fn try_handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<AdmissionResponse, Error> {
        let original = self
            .decoder
            .decode_raw(request)
            .context(DecodeKnativeServingSnafu)?;
        self.decoder
            .check_type(&original, crd::API_VERSION, crd::KIND)
            .context(DecodeKnativeServingSnafu)?;
        let mut serving: KnativeServing = self
            .decoder
            .decode(request)
            .context(DecodeKnativeServingSnafu)?;

        tracing::debug!(
            k8s.knativeserving.name = serving.metadata.name.as_deref(),
            k8s.namespace = serving.metadata.namespace.as_deref(),
            admission.uid = request.uid.as_str(),
            "defaulting KnativeServing"
        );

        mutate(&mut serving).context(ApplyDefaultsSnafu)?;

        let mutated = serde_json::to_value(&serving).context(SerializeKnativeServingSnafu)?;
        Ok(admission::patch_response_from_raw(request, &original, &mutated))
    }
}

async fn handle_admission(
    configurator: Arc<KnativeServingConfigurator>,
    request: AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    configurator.handle(&request)
}

/// Runs all defaulting rules against `serving`.
///
/// None of the current rules can fail.
pub fn mutate(serving: &mut KnativeServing) -> Result<(), Infallible> {
    default_istio_outbound_ip_ranges(serving);
    Ok(())
}

/// Sets the Istio outbound IP ranges unless the user configured a non-empty value.
fn default_istio_outbound_ip_ranges(serving: &mut KnativeServing) {
    let configured = serving.config_value(NETWORK_CONFIG_GROUP, ISTIO_OUTBOUND_IP_RANGES_KEY);
    if configured.is_some_and(|value| !value.is_empty()) {
        return;
    }

    serving.config_group_mut(NETWORK_CONFIG_GROUP).insert(
        ISTIO_OUTBOUND_IP_RANGES_KEY.to_owned(),
        Some(DEFAULT_ISTIO_OUTBOUND_IP_RANGES.to_owned()),
    );
}

/// Returns the `MutatingWebhookConfiguration` which routes `KnativeServing` admissions to the
/// webhook behind the given service.
///
/// The CA bundle is left empty, it is expected to be injected by the OpenShift service CA.
pub fn mutating_webhook_configuration(
    service_name: &str,
    service_namespace: &str,
    port: u16,
) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_CONFIGURATION_NAME.to_owned()),
            ..ObjectMeta::default()
        },
        webhooks: Some(vec![MutatingWebhookEntry {
            name: WEBHOOK_CONFIGURATION_NAME.to_owned(),
            admission_review_versions: vec!["v1".to_owned()],
            client_config: create_webhook_client_config(
                service_name,
                service_namespace,
                port,
                WEBHOOK_PATH,
            ),
            failure_policy: Some("Ignore".to_owned()),
            side_effects: "None".to_owned(),
            rules: Some(vec![RuleWithOperations {
                api_groups: Some(vec![crd::GROUP.to_owned()]),
                api_versions: Some(vec![crd::VERSION.to_owned()]),
                operations: Some(vec!["CREATE".to_owned(), "UPDATE".to_owned()]),
                resources: Some(vec![crd::PLURAL.to_owned()]),
                ..RuleWithOperations::default()
            }]),
            ..MutatingWebhookEntry::default()
        }]),
    }
}
