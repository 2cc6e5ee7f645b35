use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cluster_repair_live::{
    backend::HttpBackend,
    config::Config,
    Dashboard,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cluster Repair Live");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(backend = %config.url_prefix(), "Configuration loaded");

    let backend = Arc::new(HttpBackend::new(&config)?);
    let dashboard = Dashboard::bootstrap(config, backend).await?;
    for name in dashboard.cluster_names() {
        tracing::info!(cluster = %name, "Known cluster");
    }

    let mut topology = Box::pin(dashboard.topology());
    let mut events = dashboard.diagnostic_events();
    let mut logged_out = dashboard.session().logout_result().subscribe();

    dashboard.start();

    loop {
        tokio::select! {
            Some(groups) = topology.next() => {
                let endpoints: usize = groups.iter().map(|g| g.children.len()).sum();
                tracing::info!(
                    selection = %dashboard.selection(),
                    datacenters = groups.len(),
                    endpoints,
                    "Topology updated"
                );
                for group in &groups {
                    let labels: Vec<_> = group.children.iter().map(|c| c.label.as_str()).collect();
                    tracing::debug!(dc = %group.label, endpoints = ?labels, "Datacenter");
                }
            }
            Some(event) = events.recv() => {
                tracing::info!(
                    subscription = ?event.subscription_id,
                    cluster = %event.cluster,
                    node = ?event.node,
                    class = %event.event_class,
                    kind = ?event.event_type,
                    "Diagnostic event"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, logging out");
                dashboard.session().logout().push(());
            }
            outcome = logged_out.recv() => {
                if let Some(e) = outcome.as_ref().and_then(|o| o.error()) {
                    tracing::error!(error = %e, "Logout failed");
                }
                break;
            }
        }
    }

    dashboard.shutdown();
    Ok(())
}
