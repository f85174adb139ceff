//! SlbClient trait for mocking
//!
//! This trait abstracts the SLB control plane so the reconciliation engine can
//! run against the real [`crate::SlbClient`] or an in-memory mock in unit tests.

use crate::error::SlbError;
use crate::models::*;

/// Operations against the SLB control plane
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Implementations perform no retries; a failed call is reported as-is.
#[async_trait::async_trait]
pub trait SlbClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Load balancer
    /// Fetch a load balancer by id
    async fn get_load_balancer(&self, slb_id: &str) -> Result<LoadBalancer, SlbError>;

    // Listeners
    /// List every listener of a load balancer
    async fn list_listeners(&self, slb_id: &str) -> Result<Vec<Listener>, SlbError>;
    /// Get a single listener
    async fn get_listener(&self, slb_id: &str, listener_id: &str) -> Result<Listener, SlbError>;
    /// Create a listener
    async fn create_listener(&self, opts: &ListenerOpts) -> Result<Listener, SlbError>;
    /// Update a listener in place
    async fn update_listener(
        &self,
        listener_id: &str,
        opts: &ListenerOpts,
    ) -> Result<Listener, SlbError>;
    /// Delete a listener
    async fn delete_listener(&self, slb_id: &str, listener_id: &str) -> Result<(), SlbError>;

    // Backend members
    /// List the members of a listener
    async fn list_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<Backend>, SlbError>;
    /// Register members under a listener
    async fn create_backends(&self, opts: &CreateBackendOpts) -> Result<Vec<Backend>, SlbError>;
    /// Deregister members by server id
    async fn delete_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
        server_ids: &[String],
    ) -> Result<(), SlbError>;
}
