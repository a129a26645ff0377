use std::{marker::PhantomData, sync::Arc};

use axum::{Json, Router, routing::post};
use kube::{
    Resource,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use serde::{Serialize, de::DeserializeOwned};

use super::Webhook;

/// Mutating webhook, which let's you intercept object creations/modification and modify the object
/// on the fly.
///
/// As the webhook is typed with the Resource type `R`, it can only handle a single resource
/// mutation. Use [`DynamicObject`][kube::core::DynamicObject] together with a
/// [`Decoder`][crate::admission::Decoder] to keep unknown fields of the object intact.
///
/// ### Example usage
///
/// ```
/// use std::sync::Arc;
///
/// use kube::core::{
///     DynamicObject,
///     admission::{AdmissionRequest, AdmissionResponse},
/// };
/// use serving_webhook::webhooks::MutatingWebhook;
///
/// // Basic no-op implementation
/// async fn my_handler(
///     _state: Arc<()>,
///     request: AdmissionRequest<DynamicObject>,
/// ) -> AdmissionResponse {
///     AdmissionResponse::from(&request)
/// }
///
/// let webhook: MutatingWebhook<_, _, DynamicObject> =
///     MutatingWebhook::new("/mutate-my-resource", my_handler, Arc::new(()));
/// ```
pub struct MutatingWebhook<H, S, R> {
    /// The HTTP path the handler is mounted at. This is a contract with the
    /// `MutatingWebhookConfiguration` registered on the API server.
    http_path: String,

    /// The async handler that get's a [`AdmissionRequest`] and returns an [`AdmissionResponse`]
    handler: H,

    /// The internal state of the webhook. It is built once before the server starts and only
    /// read afterwards.
    handler_state: Arc<S>,

    /// This field is not needed, it only tracks the type of the Kubernetes resource we are mutating
    _resource: PhantomData<R>,
}

impl<H, S, R> MutatingWebhook<H, S, R> {
    pub fn new(http_path: impl Into<String>, handler: H, handler_state: Arc<S>) -> Self {
        Self {
            http_path: http_path.into(),
            handler,
            handler_state,
            _resource: PhantomData,
        }
    }
}

impl<H, S, R, Fut> Webhook for MutatingWebhook<H, S, R>
where
    H: Fn(Arc<S>, AdmissionRequest<R>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = AdmissionResponse> + Send + 'static,
    R: Resource + Send + Sync + DeserializeOwned + Serialize + 'static,
    S: Send + Sync + 'static,
{
    fn register_routes(&self, router: Router) -> Router {
        let handler_state = self.handler_state.clone();
        let handler = self.handler.clone();
        let handler_fn = |Json(review): Json<AdmissionReview<R>>| async move {
            let request: AdmissionRequest<R> = match review.try_into() {
                Ok(request) => request,
                Err(err) => {
                    return Json(
                        AdmissionResponse::invalid(format!("failed to convert to request: {err}"))
                            .into_review(),
                    );
                }
            };

            let response = handler(handler_state, request).await;
            let review = response.into_review();
            Json(review)
        };

        let route = self.http_path.as_str();
        tracing::debug!(route, "Registering route for mutating webhook");
        router.route(route, post(handler_fn))
    }

    fn http_path(&self) -> &str {
        &self.http_path
    }
}
