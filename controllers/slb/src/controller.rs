//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the SLB client,
//! the candidate resolver and the reconciler together and runs the Service
//! watcher.

use crate::candidates::{CandidateResolver, ClusterNodesResolver, ServicePodNodesResolver};
use crate::config::{AuthConfig, BackendMode, ControllerConfig};
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{Context, Watcher};
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use slb_client::{KeycloakTokenSource, SlbClient, SlbClientTrait, StaticToken, TokenSource};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Main controller for LoadBalancer Services.
pub struct Controller {
    service_watcher: JoinHandle<Result<(), ControllerError>>,
}

fn token_source(config: &ControllerConfig) -> Result<Arc<dyn TokenSource>, ControllerError> {
    match &config.auth {
        AuthConfig::Static { token } => Ok(Arc::new(StaticToken::new(token.clone()))),
        AuthConfig::Keycloak {
            token_url,
            client_id,
            client_secret,
            requested_subject,
        } => {
            let http = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .map_err(|e| {
                    ControllerError::InvalidConfig(format!(
                        "failed to build token exchange client: {}",
                        e
                    ))
                })?;
            Ok(Arc::new(KeycloakTokenSource::new(
                http,
                token_url.clone(),
                client_id.clone(),
                client_secret.clone(),
                requested_subject.clone(),
            )))
        }
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing SLB Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Create SLB client
        let tokens = token_source(&config)?;
        let slb_client =
            SlbClient::new(config.slb_url_prefix.clone(), tokens, config.request_timeout)?;

        // Validate credentials and the configured load balancer before watching
        if config.slb_id.is_empty() {
            warn!("SLB_ID is empty, skipping load balancer validation");
        } else {
            info!("Validating SLB connectivity...");
            let lb = slb_client.get_load_balancer(&config.slb_id).await.map_err(|e| {
                error!("Failed to read load balancer {}: {}", config.slb_id, e);
                error!("Please ensure:");
                error!("  1. SLB credentials are set correctly");
                error!("  2. Load balancer {} exists", config.slb_id);
                error!("  3. The SLB API is reachable at {}", config.slb_url_prefix);
                ControllerError::Slb(e)
            })?;
            info!(
                "SLB connectivity established, load balancer {} ({}) at {}",
                lb.slb_id, lb.slb_name, lb.business_ip
            );
        }

        let resolver: Arc<dyn CandidateResolver> = match config.backend_mode {
            BackendMode::ClusterNodes => Arc::new(ClusterNodesResolver::new(kube_client.clone())),
            BackendMode::ServicePodNodes => {
                Arc::new(ServicePodNodesResolver::new(kube_client.clone()))
            }
        };

        let slb_client: Arc<dyn SlbClientTrait> = Arc::new(slb_client);
        let reconciler = Arc::new(Reconciler::new(
            slb_client,
            config.slb_id.clone(),
            config.annotation_defaults.clone(),
        ));

        let context = Arc::new(Context {
            reconciler,
            resolver,
            client: kube_client.clone(),
            resync_interval: config.resync_interval,
            reconcile_timeout: config.reconcile_timeout,
        });

        let services: Api<Service> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client, ns),
            None => Api::all(kube_client),
        };

        let watcher_instance = Arc::new(Watcher::new(context, services));
        let service_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_services().await })
        };

        Ok(Self { service_watcher })
    }

    /// Runs the controller until the watcher stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("SLB Controller running");

        match self.service_watcher.await {
            Ok(result) => result,
            Err(e) => {
                error!("Service watcher task failed: {}", e);
                Err(ControllerError::Watch(e.to_string()))
            }
        }
    }
}
