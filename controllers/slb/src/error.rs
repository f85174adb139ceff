//! Controller-specific error types.
//!
//! This module defines the errors raised while converging a Service onto the
//! SLB, on top of the upstream Kubernetes and SLB client errors.

use kube::Error as KubeError;
use slb_client::SlbError;
use thiserror::Error;

/// Errors that can occur in the SLB Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// SLB API error
    #[error("SLB error: {0}")]
    Slb(#[from] SlbError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The Service declares no ports
    #[error("No ports provided for load balancer service {0}")]
    NoPortsConfigured(String),

    /// No load balancer id is configured for this controller
    #[error("No load balancer configured for service {0}")]
    LoadBalancerNotConfigured(String),

    /// The configured load balancer does not exist on the control plane
    #[error("Load balancer {0} not found")]
    LoadBalancerNotFound(String),

    /// Some backend additions or removals failed for a listener
    #[error(
        "Listener {listener_id} sync failed: adds {adds:?}, removals {removals:?}",
        adds = .failed_additions,
        removals = .failed_removals
    )]
    PartialSyncFailure {
        /// Listener being converged
        listener_id: String,
        /// Server ids that could not be registered
        failed_additions: Vec<String>,
        /// Server ids that could not be deregistered
        failed_removals: Vec<String>,
    },

    /// No nodes can serve the Service
    #[error("There are no available nodes for load balancer service {0}")]
    NoAvailableBackends(String),

    /// Finalizer handling failed
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube_runtime::finalizer::Error<ControllerError>>),

    /// A reconciliation pass exceeded its deadline
    #[error("Reconciliation of {0} timed out")]
    Timeout(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether retrying the same pass can succeed without operator action.
    ///
    /// Configuration problems (no load balancer id, no ports, bad settings)
    /// are fatal for the pass; everything else is left to the requeue backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidConfig(_)
            | Self::NoPortsConfigured(_)
            | Self::LoadBalancerNotConfigured(_) => false,
            Self::Slb(e) => !matches!(e, SlbError::InvalidRequest(_)),
            Self::Finalizer(e) => match e.as_ref() {
                kube_runtime::finalizer::Error::ApplyFailed(inner)
                | kube_runtime::finalizer::Error::CleanupFailed(inner) => inner.is_retryable(),
                _ => true,
            },
            _ => true,
        }
    }
}
