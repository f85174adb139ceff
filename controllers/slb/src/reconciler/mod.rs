//! Reconciliation engine for SLB-backed Services.
//!
//! The engine converges one [`ExposureRequest`] at a time against the
//! configured load balancer:
//! - `intent`: desired state from ports and annotations
//! - `listener`: matching desired ports to remote listeners
//! - `backend`: backend membership diff and sync
//!
//! A pass runs strictly sequentially and never retries. A failure aborts the
//! remaining ports and leaves already-converged ports in place; the caller
//! requeues the whole pass.

pub mod backend;
pub mod intent;
pub mod listener;


use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use backend::{desired_servers, sync_backends};
use intent::{AnnotationDefaults, ExposureRequest, extract_intent, is_internal};
use listener::{listener_name, listener_opts, match_listener, needs_update};
use slb_client::{LoadBalancer, SlbClientTrait};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::default(),
            error_count: 0,
        }
    }

    fn reset(&mut self) {
        self.backoff.reset();
        self.error_count = 0;
    }
}

/// Public addresses of a converged load balancer
pub type IngressAddresses = Vec<String>;

/// Addresses advertised for `lb`: business IP first, then the elastic IP
/// unless the Service is internal or none is bound.
pub fn ingress_addresses(lb: &LoadBalancer, internal: bool) -> IngressAddresses {
    let mut addresses = vec![lb.business_ip.clone()];
    if !internal && !lb.eip_address.is_empty() {
        addresses.push(lb.eip_address.clone());
    }
    addresses
}

/// Reconciles exposure requests against one SLB instance.
pub struct Reconciler {
    slb_client: Arc<dyn SlbClientTrait>,
    slb_id: String,
    defaults: AnnotationDefaults,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("slb_url", &self.slb_client.base_url())
            .field("slb_id", &self.slb_id)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    ///
    /// An empty `slb_id` means no load balancer is configured: ensure fails
    /// with [`ControllerError::LoadBalancerNotConfigured`] and delete succeeds
    /// without touching the control plane.
    pub fn new(
        slb_client: Arc<dyn SlbClientTrait>,
        slb_id: impl Into<String>,
        defaults: AnnotationDefaults,
    ) -> Self {
        Self {
            slb_client,
            slb_id: slb_id.into(),
            defaults,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Looks up the configured load balancer.
    ///
    /// Returns `Ok(None)` when no load balancer id is configured.
    async fn resolve_load_balancer(&self) -> Result<Option<LoadBalancer>, ControllerError> {
        if self.slb_id.is_empty() {
            return Ok(None);
        }
        let lb = self.slb_client.get_load_balancer(&self.slb_id).await?;
        Ok(Some(lb))
    }

    /// Converges listeners and members for the request and returns the
    /// addresses to publish.
    pub async fn ensure_load_balancer(
        &self,
        request: &ExposureRequest,
    ) -> Result<IngressAddresses, ControllerError> {
        let started = Instant::now();
        let result = self.converge(request).await;
        info!(
            "EnsureLoadBalancer for {} took {}ms",
            request.key(),
            started.elapsed().as_millis()
        );
        result
    }

    /// Same convergence as [`Self::ensure_load_balancer`], discarding the addresses.
    pub async fn update_load_balancer(
        &self,
        request: &ExposureRequest,
    ) -> Result<(), ControllerError> {
        let started = Instant::now();
        let result = self.converge(request).await.map(|_| ());
        info!(
            "UpdateLoadBalancer for {} took {}ms",
            request.key(),
            started.elapsed().as_millis()
        );
        result
    }

    async fn converge(
        &self,
        request: &ExposureRequest,
    ) -> Result<IngressAddresses, ControllerError> {
        let key = request.key();

        let lb = match self.resolve_load_balancer().await {
            Ok(Some(lb)) => lb,
            Ok(None) => return Err(ControllerError::LoadBalancerNotConfigured(key)),
            Err(ControllerError::Slb(e)) if e.is_not_found() => {
                error!("Load balancer {} for {} does not exist", self.slb_id, key);
                return Err(ControllerError::LoadBalancerNotFound(self.slb_id.clone()));
            }
            Err(e) => return Err(e),
        };

        let desired = extract_intent(request, &self.defaults)?;
        info!(
            "Converging {} onto {} ({} ports, {} candidates, forward rule {}, health check {})",
            key,
            lb.slb_id,
            desired.ports.len(),
            request.candidates.len(),
            desired.forward_rule,
            desired.health_check
        );

        let mut listeners = self.slb_client.list_listeners(&lb.slb_id).await?;

        for (index, port) in desired.ports.iter().enumerate() {
            let servers = desired_servers(&request.candidates, port)?;

            let listener_id = match match_listener(&listeners, port).cloned() {
                None => {
                    let name = listener_name(port, index);
                    let opts = listener_opts(&lb.slb_id, name, port, &desired);
                    info!(
                        "Creating listener {} for {} port {}",
                        opts.listener_name, port.protocol, port.external_port
                    );
                    let created = self.slb_client.create_listener(&opts).await?;
                    let id = created.listener_id.clone();
                    listeners.push(created);
                    id
                }
                Some(existing) if needs_update(&existing, &desired) => {
                    let name = if existing.listener_name.is_empty() {
                        listener_name(port, index)
                    } else {
                        existing.listener_name.clone()
                    };
                    let opts = listener_opts(&lb.slb_id, name, port, &desired);
                    info!(
                        "Updating listener {} for {} port {}: rule {} -> {}, health check {} -> {}",
                        existing.listener_id,
                        port.protocol,
                        port.external_port,
                        existing.forward_rule,
                        opts.forward_rule,
                        existing.is_health_check,
                        opts.is_health_check
                    );
                    self.slb_client
                        .update_listener(&existing.listener_id, &opts)
                        .await?;
                    existing.listener_id
                }
                Some(existing) => {
                    debug!(
                        "Listener {} for {} port {} is up to date",
                        existing.listener_id, port.protocol, port.external_port
                    );
                    existing.listener_id
                }
            };

            let listener = self
                .slb_client
                .get_listener(&lb.slb_id, &listener_id)
                .await?;
            sync_backends(
                self.slb_client.as_ref(),
                &lb.slb_id,
                &listener.listener_id,
                &servers,
            )
            .await?;
        }

        Ok(ingress_addresses(&lb, desired.internal))
    }

    /// Removes the request's members and listeners from the load balancer.
    ///
    /// Members are always removed before their listener. A load balancer that
    /// is not configured or no longer exists leaves nothing to delete.
    pub async fn ensure_load_balancer_deleted(
        &self,
        request: &ExposureRequest,
    ) -> Result<(), ControllerError> {
        let started = Instant::now();
        let result = self.teardown(request).await;
        info!(
            "EnsureLoadBalancerDeleted for {} took {}ms",
            request.key(),
            started.elapsed().as_millis()
        );
        result
    }

    async fn teardown(&self, request: &ExposureRequest) -> Result<(), ControllerError> {
        let key = request.key();

        let lb = match self.resolve_load_balancer().await {
            Ok(Some(lb)) => lb,
            Ok(None) => {
                info!("No load balancer configured for {}, nothing to delete", key);
                return Ok(());
            }
            Err(ControllerError::Slb(e)) if e.is_not_found() => {
                info!("Load balancer {} for {} is already gone", self.slb_id, key);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if request.ports.is_empty() {
            warn!("{} declares no ports, nothing to delete", key);
            return Ok(());
        }

        let listeners = match self.slb_client.list_listeners(&lb.slb_id).await {
            Ok(listeners) => listeners,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for port in &request.ports {
            let Some(listener) = match_listener(&listeners, port) else {
                debug!(
                    "No listener for {} port {}, skipping",
                    port.protocol, port.external_port
                );
                continue;
            };

            let members = match self
                .slb_client
                .list_backends(&lb.slb_id, &listener.listener_id)
                .await
            {
                Ok(members) => members,
                Err(e) if e.is_not_found() => {
                    debug!("Listener {} already deleted", listener.listener_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !members.is_empty() {
                let mut server_ids: Vec<String> = Vec::with_capacity(members.len());
                for member in members {
                    if !server_ids.contains(&member.server_id) {
                        server_ids.push(member.server_id);
                    }
                }
                info!(
                    "Removing {} members from listener {}",
                    server_ids.len(),
                    listener.listener_id
                );
                self.slb_client
                    .delete_backends(&lb.slb_id, &listener.listener_id, &server_ids)
                    .await?;
            }

            info!(
                "Deleting listener {} for {} port {}",
                listener.listener_id, port.protocol, port.external_port
            );
            match self
                .slb_client
                .delete_listener(&lb.slb_id, &listener.listener_id)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Listener {} already deleted", listener.listener_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Current addresses of the load balancer, or `None` when it is not
    /// configured or does not exist.
    pub async fn get_load_balancer(
        &self,
        request: &ExposureRequest,
    ) -> Result<Option<IngressAddresses>, ControllerError> {
        match self.resolve_load_balancer().await {
            Ok(Some(lb)) => Ok(Some(ingress_addresses(&lb, is_internal(request, &self.defaults)))),
            Ok(None) => {
                debug!("No load balancer configured for {}", request.key());
                Ok(None)
            }
            Err(ControllerError::Slb(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Display name of the load balancer; empty when it cannot be resolved.
    pub async fn get_load_balancer_name(&self, request: &ExposureRequest) -> String {
        match self.resolve_load_balancer().await {
            Ok(Some(lb)) => lb.slb_name,
            Ok(None) => String::new(),
            Err(e) => {
                error!("Failed to get load balancer for {}: {}", request.key(), e);
                String::new()
            }
        }
    }

    /// Get the Fibonacci backoff for a resource and count the failure
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(FibonacciBackoff::DEFAULT_MIN_SECONDS), 0)
            }
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}
