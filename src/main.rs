//! llmisvc operator - LLM inference serving control plane

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use llmisvc::config::OperatorConfig;
use llmisvc::crd::{LLMInferenceService, LLMInferenceServiceConfig};
use llmisvc::webhook::webhook_router;

/// Kubernetes operator reconciling LLMInferenceService resources
#[derive(Parser, Debug)]
#[command(name = "llmisvc", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation controller (default mode)
    Controller,

    /// Serve the validating admission webhook
    Webhook(WebhookArgs),
}

/// Webhook mode arguments
#[derive(Parser, Debug)]
struct WebhookArgs {
    /// Listen address for the webhook server
    #[arg(long, default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    /// Path to the TLS certificate
    #[arg(long, env = "WEBHOOK_TLS_CERT", default_value = "/etc/webhook/certs/tls.crt")]
    tls_cert: String,

    /// Path to the TLS private key
    #[arg(long, env = "WEBHOOK_TLS_KEY", default_value = "/etc/webhook/certs/tls.key")]
    tls_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install crypto provider");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let service_crd = serde_yaml::to_string(&LLMInferenceService::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        let config_crd = serde_yaml::to_string(&LLMInferenceServiceConfig::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{service_crd}---\n{config_crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Webhook(args)) => run_webhook(args).await,
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Run in controller mode - converges LLMInferenceService topologies
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("llmisvc controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let config = OperatorConfig::from_env();
    tracing::info!(
        system_namespace = %config.system_namespace,
        ingress_gateway = %format!("{}/{}", config.ingress_gateway_namespace, config.ingress_gateway_name),
        auth_disabled = config.auth_disabled,
        "operator configuration loaded"
    );

    llmisvc::controller::run(client, config)
        .await
        .map_err(|e| anyhow::anyhow!("Controller failed: {}", e))?;

    tracing::info!("llmisvc controller shutting down");
    Ok(())
}

/// Run in webhook mode - validates admission requests over TLS
async fn run_webhook(args: WebhookArgs) -> anyhow::Result<()> {
    tracing::info!(addr = %args.addr, "llmisvc webhook starting...");

    let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
        &args.tls_cert,
        &args.tls_key,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to configure TLS: {}", e))?;

    let router = webhook_router();

    axum_server::bind_rustls(args.addr, tls_config)
        .serve(router.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("Webhook server error: {}", e))?;

    Ok(())
}
