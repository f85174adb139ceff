//! SLB Controller
//!
//! Service controller for Kubernetes LoadBalancer Services:
//! - Creates one SLB listener per Service port
//! - Keeps listener members in sync with the nodes serving the Service
//! - Publishes the load balancer addresses as the Service ingress
//! - Removes listeners and members when the Service goes away

mod backoff;
mod candidates;
mod config;
mod controller;
mod error;
mod reconciler;
mod service;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Configure rustls crypto provider (ring) before any TLS client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting SLB Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;
    config.log_summary();

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
