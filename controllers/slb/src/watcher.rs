//! Kubernetes Service watcher.
//!
//! Watches Services with kube_runtime::Controller and hands LoadBalancer
//! Services to the [`Reconciler`]. A finalizer keeps the Service around until
//! its listeners and members have been removed from the load balancer.

use crate::candidates::{CandidateResolver, resolve_candidates};
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::service::{
    clear_status_patch, current_ingress_ips, is_load_balancer, service_key, status_needs_update,
    status_patch, to_exposure_request, to_teardown_request,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::finalizer::{Error as FinalizerError, Event as Finalizer, finalizer};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finalizer guarding load balancer cleanup
pub const FINALIZER: &str = "slb.microscaler.io/load-balancer-cleanup";

const FIELD_MANAGER: &str = "slb-controller";

/// Shared state for every reconciliation
pub struct Context {
    /// Drives the SLB side of a Service
    pub reconciler: Arc<Reconciler>,
    /// Picks the nodes behind each listener
    pub resolver: Arc<dyn CandidateResolver>,
    /// Kubernetes client for status and finalizer patches
    pub client: Client,
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
    /// Upper bound on a single pass
    pub reconcile_timeout: Duration,
}

/// What a pass has to do with a Service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Not ours
    Skip,
    /// No longer a LoadBalancer but still holds our finalizer
    Release,
    /// Converge or clean up through the finalizer
    Reconcile,
}

fn has_finalizer(service: &Service) -> bool {
    service.finalizers().iter().any(|f| f == FINALIZER)
}

/// Decides how a pass treats `service`
pub fn determine_action(service: &Service) -> ServiceAction {
    let owned = has_finalizer(service);
    let deleting = service.metadata.deletion_timestamp.is_some();

    match (is_load_balancer(service), owned, deleting) {
        (true, _, _) => ServiceAction::Reconcile,
        (false, true, true) => ServiceAction::Reconcile,
        (false, true, false) => ServiceAction::Release,
        (false, false, _) => ServiceAction::Skip,
    }
}

async fn apply(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = service_key(&service);
    let candidates = resolve_candidates(ctx.resolver.as_ref(), &service).await?;
    let request = to_exposure_request(&service, candidates)?;

    // A Service that already publishes an ingress only needs its listeners refreshed
    let addresses = if current_ingress_ips(&service).is_empty() {
        Some(ctx.reconciler.ensure_load_balancer(&request).await?)
    } else {
        ctx.reconciler.update_load_balancer(&request).await?;
        ctx.reconciler.get_load_balancer(&request).await?
    };

    match addresses {
        Some(addresses) if status_needs_update(&service, &addresses) => {
            let api: Api<Service> = Api::namespaced(ctx.client.clone(), &request.namespace);
            api.patch_status(
                &request.name,
                &PatchParams::default(),
                &Patch::Merge(&status_patch(&addresses)),
            )
            .await?;
            let lb_name = ctx.reconciler.get_load_balancer_name(&request).await;
            info!("Published ingress {:?} of load balancer '{}' for {}", addresses, lb_name, key);
        }
        Some(_) => debug!("Ingress of {} is up to date", key),
        None => warn!("Load balancer for {} disappeared after update", key),
    }

    ctx.reconciler.reset_error(&key);
    Ok(Action::requeue(ctx.resync_interval))
}

async fn cleanup(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let request = to_teardown_request(&service);
    ctx.reconciler.ensure_load_balancer_deleted(&request).await?;
    ctx.reconciler.reset_error(&request.key());
    Ok(Action::await_change())
}

/// Tears down a Service that stopped being a LoadBalancer and drops our finalizer.
async fn release(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = service_key(&service);
    info!("{} is no longer a LoadBalancer, releasing its listeners", key);

    let request = to_teardown_request(&service);
    ctx.reconciler.ensure_load_balancer_deleted(&request).await?;

    let api: Api<Service> = Api::namespaced(ctx.client.clone(), &request.namespace);
    if !current_ingress_ips(&service).is_empty() {
        api.patch_status(
            &request.name,
            &PatchParams::default(),
            &Patch::Merge(&clear_status_patch()),
        )
        .await?;
    }

    let finalizers: Vec<String> = service
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(&request.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    ctx.reconciler.reset_error(&key);
    Ok(Action::await_change())
}

/// Reconciles one Service.
pub async fn reconcile(
    service: Arc<Service>,
    ctx: Arc<Context>,
) -> Result<Action, ControllerError> {
    let key = service_key(&service);

    match determine_action(&service) {
        ServiceAction::Skip => {
            debug!("Ignoring {}: not a LoadBalancer Service", key);
            Ok(Action::await_change())
        }
        ServiceAction::Release => release(service, ctx).await,
        ServiceAction::Reconcile => {
            let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
            let api: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
            let timeout = ctx.reconcile_timeout;

            let pass = finalizer(&api, FINALIZER, service, |event| async move {
                match event {
                    Finalizer::Apply(service) => apply(service, ctx).await,
                    Finalizer::Cleanup(service) => cleanup(service, ctx).await,
                }
            });

            match tokio::time::timeout(timeout, pass).await {
                Ok(Ok(action)) => Ok(action),
                Ok(Err(FinalizerError::ApplyFailed(e) | FinalizerError::CleanupFailed(e))) => {
                    Err(e)
                }
                Ok(Err(e)) => Err(ControllerError::Finalizer(Box::new(e))),
                Err(_) => Err(ControllerError::Timeout(key)),
            }
        }
    }
}

/// Requeue policy: configuration problems wait for the Service to change,
/// everything else backs off per Service.
pub fn error_policy(service: Arc<Service>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = service_key(&service);

    if !error.is_retryable() {
        warn!("Not retrying {} until it changes: {}", key, error);
        return Action::await_change();
    }

    let (backoff, error_count) = ctx.reconciler.get_backoff_for_resource(&key);
    error!(
        "Reconciliation of {} failed (attempt {}), retrying in {}s: {}",
        key,
        error_count,
        backoff.as_secs(),
        error
    );
    Action::requeue(backoff)
}

/// Watches Kubernetes Services for changes.
pub struct Watcher {
    context: Arc<Context>,
    services: Api<Service>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(context: Arc<Context>, services: Api<Service>) -> Self {
        Self { context, services }
    }

    /// Runs the Service controller until shutdown is signalled.
    pub async fn watch_services(&self) -> Result<(), ControllerError> {
        info!("Starting Service watcher");

        // Debounce batches status writes from other controllers
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(4);

        Controller::new(self.services.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.context.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!(
                        "Reconciled Service {}/{}",
                        obj.namespace.as_deref().unwrap_or_default(),
                        obj.name
                    ),
                    Err(e) => error!("Service controller error: {}", e),
                }
            })
            .await;

        info!("Service watcher stopped");
        Ok(())
    }
}
