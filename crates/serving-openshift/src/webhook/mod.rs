//! The webhooks installed on OpenShift clusters.
//!
//! Webhooks are collected in a [`WebhookRegistry`] by the composition root. Installing the
//! registry probes the cluster once and yields the webhooks to serve, which is none at all
//! outside of OpenShift.
use kube::Client;
use serving_webhook::{admission::Decoder, webhooks::Webhook};

use crate::probe::{RouteLister, running_on_openshift};

pub mod knative_serving;

/// Shared dependencies handed to every installer.
#[derive(Clone)]
pub struct InstallContext {
    pub client: Option<Client>,
    pub decoder: Decoder,
}

type Installer = Box<dyn Fn(&InstallContext) -> Box<dyn Webhook> + Send + Sync>;

/// An ordered list of webhook installers.
#[derive(Default)]
pub struct WebhookRegistry {
    installers: Vec<Installer>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registry containing all webhooks of this crate.
    pub fn with_defaults() -> Self {
        Self::new().register(|context| {
            knative_serving::KnativeServingConfigurator::new(
                context.decoder,
                context.client.clone(),
            )
            .into_webhook()
        })
    }

    /// Appends `installer`. Installers run in registration order.
    #[must_use]
    pub fn register<F>(mut self, installer: F) -> Self
    where
        F: Fn(&InstallContext) -> Box<dyn Webhook> + Send + Sync + 'static,
    {
        self.installers.push(Box::new(installer));
        self
    }

    pub fn len(&self) -> usize {
        self.installers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }

    /// Probes the cluster through `lister` and invokes every installer if it is OpenShift.
    ///
    /// Returns no webhooks otherwise.
    pub async fn install(
        &self,
        client: Option<Client>,
        lister: &impl RouteLister,
    ) -> Vec<Box<dyn Webhook>> {
        if !running_on_openshift(lister).await {
            tracing::info!("OpenShift not detected; no webhooks will be configured");
            return Vec::new();
        }

        let context = InstallContext {
            client,
            decoder: Decoder::new(),
        };

        let webhooks: Vec<_> = self
            .installers
            .iter()
            .map(|installer| installer(&context))
            .collect();

        for webhook in &webhooks {
            tracing::info!(http_path = webhook.http_path(), "configured webhook");
        }

        webhooks
    }
}
