//! Command line interface of the `serving-openshift-webhook` binary.
use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use serving_webhook::constants::{DEFAULT_CERT_DIR, DEFAULT_SOCKET_ADDRESS};

use crate::telemetry::TelemetryOptions;

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the webhook server.
    Run(RunArguments),

    /// Print the MutatingWebhookConfiguration which routes KnativeServing admissions to the
    /// webhook server.
    WebhookConfiguration(WebhookConfigurationArguments),
}

#[derive(clap::Args, Debug, PartialEq, Eq)]
pub struct RunArguments {
    /// The socket address the HTTPS server binds to.
    #[arg(long, env, default_value_t = DEFAULT_SOCKET_ADDRESS)]
    pub webhook_bind_address: SocketAddr,

    /// The DIRECTORY containing the serving certificate `tls.crt` and its key `tls.key`.
    #[arg(long, env, value_name = "DIRECTORY", default_value = DEFAULT_CERT_DIR)]
    pub webhook_cert_dir: PathBuf,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(clap::Args, Debug, PartialEq, Eq)]
pub struct WebhookConfigurationArguments {
    /// Name of the Service in front of the webhook server.
    #[arg(long, default_value = "knative-openshift-webhook")]
    pub service_name: String,

    /// Namespace of the Service in front of the webhook server.
    #[arg(long, default_value = "knative-serving")]
    pub service_namespace: String,

    /// Port of the Service in front of the webhook server.
    #[arg(long, default_value_t = 443)]
    pub service_port: u16,
}
