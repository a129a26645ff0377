//! A mutating admission webhook applying OpenShift specific defaults to `KnativeServing`
//! resources.
//!
//! The webhook is only served on OpenShift clusters, which are detected by [`probe`]. The
//! defaulting itself lives in [`webhook::knative_serving`], the HTTPS server is provided by
//! [`serving_webhook`].
pub mod cli;
pub mod crd;
pub mod probe;
pub mod telemetry;
pub mod webhook;
