//! Utility types and functions to easily create ready-to-use admission webhook
//! servers. All webhook servers use HTTPS with certificates mounted into the
//! container. This library is fully compatible with the [`tracing`] crate and
//! emits debug level tracing data.
//!
//! Most users will only use the top-level exported [`WebhookServer`] together
//! with one or more [`MutatingWebhook`][1]s. The [`admission`] module contains
//! helpers to decode admission objects and to turn a mutation into a JSON patch
//! response.
//!
//! ```no_run
//! use serving_webhook::{WebhookServer, WebhookServerOptions};
//!
//! # async fn docs() {
//! let options = WebhookServerOptions::builder()
//!     .bind_port(9443)
//!     .cert_dir("/tmp/k8s-webhook-server/serving-certs")
//!     .build();
//!
//! let server = WebhookServer::new(vec![], options).await.unwrap();
//! server.run().await.unwrap();
//! # }
//! ```
//!
//! [1]: crate::webhooks::MutatingWebhook
use axum::{Router, routing::get};
use futures_util::{FutureExt as _, pin_mut, select};
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{tls::TlsServer, webhooks::Webhook};

pub mod admission;
pub mod constants;
pub mod options;
pub mod tls;
pub mod webhooks;

// Selected re-exports
pub use crate::options::WebhookServerOptions;

/// A result type alias with the [`WebhookError`] type as the default error type.
pub type Result<T, E = WebhookError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WebhookError {
    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::TlsServerError },
}

/// A ready-to-use webhook server.
///
/// This server abstracts away lower-level details like TLS termination
/// and request tracing. The routes are contributed by the [`Webhook`]s passed
/// to [`WebhookServer::new`].
pub struct WebhookServer {
    tls_server: TlsServer,
}

impl WebhookServer {
    /// Creates a new ready-to-use webhook server.
    ///
    /// The server listens on the socket address provided via the [`WebhookServerOptions`]
    /// and serves the routes of all `webhooks`. An empty list is valid, in which case
    /// only the health route is served.
    ///
    /// To start the server, use the [`WebhookServer::run()`] function. This will
    /// run the server using the Tokio runtime until it is terminated.
    pub async fn new(
        webhooks: Vec<Box<dyn Webhook>>,
        options: WebhookServerOptions,
    ) -> Result<Self> {
        tracing::trace!("create new webhook server");

        let router = Self::router(&webhooks);

        tracing::debug!("create TLS server");
        let tls_server = TlsServer::new(router, &options)
            .await
            .context(CreateTlsServerSnafu)?;

        Ok(Self { tls_server })
    }

    /// Builds the [`Router`] serving the routes of all `webhooks`.
    pub fn router(webhooks: &[Box<dyn Webhook>]) -> Router {
        let mut router = Router::new();
        for webhook in webhooks {
            tracing::debug!(http_path = webhook.http_path(), "registering webhook");
            router = webhook.register_routes(router);
        }

        // Use a service builder to provide multiple layers at once. Recommended
        // by the Axum project.
        //
        // See https://docs.rs/axum/latest/axum/middleware/index.html#applying-multiple-middleware
        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        router
            .layer(service_builder)
            // The health route is below the TraceLayer so as not to be instrumented
            .route("/health", get(|| async { "ok" }))
    }

    /// Runs the Webhook server and sets up signal handlers for shutting down.
    ///
    /// This does not implement graceful shutdown of the underlying server.
    pub async fn run(self) -> Result<()> {
        let future_server = self.run_server();
        let future_signal = async {
            let mut sigint = signal(SignalKind::interrupt()).expect("create SIGINT listener");
            let mut sigterm = signal(SignalKind::terminate()).expect("create SIGTERM listener");

            tracing::debug!("created unix signal handlers");

            select! {
                signal = sigint.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGINT");
                    }
                },
                signal = sigterm.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGTERM");
                    }
                },
            };
        };

        // select requires Future + Unpin
        pin_mut!(future_server);
        pin_mut!(future_signal);

        match futures_util::future::select(future_server, future_signal).await {
            futures_util::future::Either::Left((result, _)) => result,
            futures_util::future::Either::Right(((), _)) => Ok(()),
        }
    }

    /// Runs the webhook server by creating a TCP listener and binding it to
    /// the specified socket address.
    async fn run_server(self) -> Result<()> {
        tracing::debug!("run webhook server");

        self.tls_server.run().await.context(RunTlsServerSnafu)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_route_without_webhooks() {
        let router = WebhookServer::router(&[]);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request must build"),
            )
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let router = WebhookServer::router(&[]);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mutate-v1alpha1-knativeserving")
                    .body(Body::empty())
                    .expect("request must build"),
            )
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
