//! Mock SlbClient for unit testing
//!
//! This module provides a mock implementation of SlbClientTrait that can be used
//! in unit tests without requiring a reachable SLB control plane.
//!
//! The mock is organized into domain-specific modules:
//! - `listeners.rs` - load balancer and listener operations
//! - `backends.rs` - backend member operations
//!
//! Every call is recorded in order, and any operation can be made to fail a
//! given number of times.

mod backends;
mod listeners;

use crate::error::SlbError;
use crate::models::*;
use crate::slb_trait::SlbClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operation kinds understood by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    GetLoadBalancer,
    ListListeners,
    GetListener,
    CreateListener,
    UpdateListener,
    DeleteListener,
    ListBackends,
    CreateBackends,
    DeleteBackends,
}

impl MockOperation {
    /// Whether the operation changes remote state
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::CreateListener
                | Self::UpdateListener
                | Self::DeleteListener
                | Self::CreateBackends
                | Self::DeleteBackends
        )
    }
}

/// A recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetLoadBalancer { slb_id: String },
    ListListeners { slb_id: String },
    GetListener { listener_id: String },
    CreateListener { listener_name: String, protocol: Protocol, port: u16 },
    UpdateListener { listener_id: String },
    DeleteListener { listener_id: String },
    ListBackends { listener_id: String },
    CreateBackends { listener_id: String, server_ids: Vec<String> },
    DeleteBackends { listener_id: String, server_ids: Vec<String> },
}

impl MockCall {
    /// Operation kind of this call
    pub fn operation(&self) -> MockOperation {
        match self {
            Self::GetLoadBalancer { .. } => MockOperation::GetLoadBalancer,
            Self::ListListeners { .. } => MockOperation::ListListeners,
            Self::GetListener { .. } => MockOperation::GetListener,
            Self::CreateListener { .. } => MockOperation::CreateListener,
            Self::UpdateListener { .. } => MockOperation::UpdateListener,
            Self::DeleteListener { .. } => MockOperation::DeleteListener,
            Self::ListBackends { .. } => MockOperation::ListBackends,
            Self::CreateBackends { .. } => MockOperation::CreateBackends,
            Self::DeleteBackends { .. } => MockOperation::DeleteBackends,
        }
    }

    /// Whether the call changes remote state
    pub fn is_mutating(&self) -> bool {
        self.operation().is_mutating()
    }
}

/// In-memory remote state
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) load_balancers: HashMap<String, LoadBalancer>,
    // Insertion order is the listing order
    pub(crate) listeners: Vec<Listener>,
    pub(crate) backends: HashMap<String, Vec<Backend>>,
    pub(crate) calls: Vec<MockCall>,
    pub(crate) failures: HashMap<MockOperation, usize>,
    pub(crate) next_id: u64,
}

impl MockState {
    /// Generate next ID with a resource prefix
    pub(crate) fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Record a call and apply any injected failure for it
    pub(crate) fn record(&mut self, call: MockCall) -> Result<(), SlbError> {
        let operation = call.operation();
        self.calls.push(call);

        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SlbError::Unavailable(format!("injected failure for {:?}", operation)))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn listener(&self, listener_id: &str) -> Result<&Listener, SlbError> {
        self.listeners
            .iter()
            .find(|l| l.listener_id == listener_id)
            .ok_or_else(|| SlbError::NotFound(format!("Listener {} not found", listener_id)))
    }
}

/// Mock SlbClient for testing
///
/// This mock stores resources in memory and can be configured to return
/// failures for testing partial-progress scenarios.
#[derive(Debug, Clone)]
pub struct MockSlbClient {
    pub(crate) base_url: String,
    pub(crate) state: Arc<Mutex<MockState>>,
}

impl MockSlbClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a load balancer to the mock store (for test setup)
    pub fn add_load_balancer(&self, lb: LoadBalancer) {
        self.lock().load_balancers.insert(lb.slb_id.clone(), lb);
    }

    /// Add a listener to the mock store (for test setup)
    pub fn add_listener(&self, listener: Listener) {
        self.lock().listeners.push(listener);
    }

    /// Add a backend member to the mock store (for test setup)
    pub fn add_backend(&self, backend: Backend) {
        self.lock()
            .backends
            .entry(backend.listener_id.clone())
            .or_default()
            .push(backend);
    }

    /// Make the next `times` calls of `operation` fail with a transient error
    pub fn fail_operation(&self, operation: MockOperation, times: usize) {
        self.lock().failures.insert(operation, times);
    }

    /// Listeners currently stored for a load balancer
    pub fn listeners(&self, slb_id: &str) -> Vec<Listener> {
        self.lock()
            .listeners
            .iter()
            .filter(|l| l.slb_id == slb_id)
            .cloned()
            .collect()
    }

    /// Backend members currently stored for a listener
    pub fn backends(&self, listener_id: &str) -> Vec<Backend> {
        self.lock()
            .backends
            .get(listener_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls that changed remote state
    pub fn mutating_calls(&self) -> Vec<MockCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait::async_trait]
impl SlbClientTrait for MockSlbClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    // Load balancer and listeners - delegated to listeners module
    async fn get_load_balancer(&self, slb_id: &str) -> Result<LoadBalancer, SlbError> {
        listeners::get_load_balancer(self, slb_id)
    }

    async fn list_listeners(&self, slb_id: &str) -> Result<Vec<Listener>, SlbError> {
        listeners::list_listeners(self, slb_id)
    }

    async fn get_listener(&self, slb_id: &str, listener_id: &str) -> Result<Listener, SlbError> {
        listeners::get_listener(self, slb_id, listener_id)
    }

    async fn create_listener(&self, opts: &ListenerOpts) -> Result<Listener, SlbError> {
        listeners::create_listener(self, opts)
    }

    async fn update_listener(
        &self,
        listener_id: &str,
        opts: &ListenerOpts,
    ) -> Result<Listener, SlbError> {
        listeners::update_listener(self, listener_id, opts)
    }

    async fn delete_listener(&self, slb_id: &str, listener_id: &str) -> Result<(), SlbError> {
        listeners::delete_listener(self, slb_id, listener_id)
    }

    // Backend members - delegated to backends module
    async fn list_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<Backend>, SlbError> {
        backends::list_backends(self, slb_id, listener_id)
    }

    async fn create_backends(&self, opts: &CreateBackendOpts) -> Result<Vec<Backend>, SlbError> {
        backends::create_backends(self, opts)
    }

    async fn delete_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
        server_ids: &[String],
    ) -> Result<(), SlbError> {
        backends::delete_backends(self, slb_id, listener_id, server_ids)
    }
}
