use clap::Parser;
use kube::Client;
use serving_openshift::{
    cli::{Cli, Command, RunArguments, WebhookConfigurationArguments},
    telemetry::{self, Tracing},
    webhook::{WebhookRegistry, knative_serving},
};
use serving_webhook::{WebhookError, WebhookServer, WebhookServerOptions};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "serving-openshift-webhook";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing { source: telemetry::Error },

    #[snafu(display("failed to serialize the MutatingWebhookConfiguration"))]
    SerializeWebhookConfiguration { source: serde_yaml::Error },

    #[snafu(display("failed to create the webhook server"))]
    CreateWebhookServer { source: WebhookError },

    #[snafu(display("failed to run the webhook server"))]
    RunWebhookServer { source: WebhookError },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run(arguments) => run(arguments).await,
        Command::WebhookConfiguration(arguments) => print_webhook_configuration(&arguments),
    }
}

async fn run(arguments: RunArguments) -> Result<(), Error> {
    let RunArguments {
        webhook_bind_address,
        webhook_cert_dir,
        telemetry,
    } = arguments;

    let _tracing_guard = Tracing::pre_configured(APP_NAME, telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting {APP_NAME}"
    );

    let registry = WebhookRegistry::with_defaults();
    let webhooks = match Client::try_default().await {
        Ok(client) => registry.install(Some(client.clone()), &client).await,
        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to create Kubernetes client; no webhooks will be configured"
            );
            Vec::new()
        }
    };

    let options = WebhookServerOptions::builder()
        .socket_addr(webhook_bind_address)
        .cert_dir(webhook_cert_dir)
        .build();

    WebhookServer::new(webhooks, options)
        .await
        .context(CreateWebhookServerSnafu)?
        .run()
        .await
        .context(RunWebhookServerSnafu)
}

fn print_webhook_configuration(arguments: &WebhookConfigurationArguments) -> Result<(), Error> {
    let configuration = knative_serving::mutating_webhook_configuration(
        &arguments.service_name,
        &arguments.service_namespace,
        arguments.service_port,
    );

    let yaml = serde_yaml::to_string(&configuration).context(SerializeWebhookConfigurationSnafu)?;
    print!("{yaml}");

    Ok(())
}
