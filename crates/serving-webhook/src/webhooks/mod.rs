use axum::Router;
use k8s_openapi::api::admissionregistration::v1::{ServiceReference, WebhookClientConfig};
pub use mutating_webhook::MutatingWebhook;

mod mutating_webhook;

/// A webhook (such as a mutating webhook) needs to implement this trait to be hosted by the
/// [`WebhookServer`][crate::WebhookServer].
pub trait Webhook: Send + Sync {
    /// The webhook can add arbitrary routes to the passed [`Router`] and needs to return the
    /// resulting [`Router`].
    fn register_routes(&self, router: Router) -> Router;

    /// The HTTP path the API server needs to call.
    fn http_path(&self) -> &str;
}

/// Returns the client config that can be used in admission webhooks.
///
/// It is used to contact the correct HTTP endpoint, which is determined from the given parameters.
/// No caBundle is set, it is expected to be injected by the cluster, e.g. by the OpenShift
/// service CA operator.
pub fn create_webhook_client_config(
    service_name: impl Into<String>,
    service_namespace: impl Into<String>,
    port: u16,
    http_path: impl Into<String>,
) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: service_name.into(),
            namespace: service_namespace.into(),
            path: Some(http_path.into()),
            port: Some(port.into()),
        }),
        ca_bundle: None,
        url: None,
    }
}
