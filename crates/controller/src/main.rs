use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use kube::Client;
use tracing::info;

use kuset_controller::Context;
use kuset_fetch::ArchiveFetcher;
use kuset_generate::{scm, Registry};
use kuset_store::KubeStore;

#[derive(Parser, Debug)]
#[command(name = "kusetd", version, about = "KustomizationSet controller")]
struct Cli {
    /// Prometheus exporter address, host:port
    #[arg(long = "metrics-addr", env = "KUSET_METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Fallback requeue in seconds when no generator reports an interval
    #[arg(long = "requeue-secs", env = "KUSET_REQUEUE_SECS", default_value_t = 180)]
    requeue_secs: u64,
}

fn init_tracing() {
    let env = std::env::var("KUSET_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<&str>) {
    if let Some(addr) = addr {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid metrics address; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    init_metrics(cli.metrics_addr.as_deref());

    let client = Client::try_default().await?;
    let store = Arc::new(KubeStore::new(client.clone()));
    let registry = Registry::new(
        store.clone(),
        Arc::new(ArchiveFetcher::default()),
        scm::default_factory(),
    );
    let ctx = Arc::new(Context {
        client,
        store,
        registry,
        default_requeue: Duration::from_secs(cli.requeue_secs),
    });

    info!(requeue_secs = cli.requeue_secs, "starting kustomization set controller");
    kuset_controller::run(ctx).await;
    Ok(())
}
