//! Backend candidate resolution.
//!
//! A [`CandidateResolver`] decides which nodes may receive a Service's
//! traffic. Both resolvers only return ready nodes that have an address.

use crate::error::ControllerError;
use crate::reconciler::intent::EndpointCandidate;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Node annotation carrying the cloud instance id
pub const INSTANCE_ID_ANNOTATION: &str = "node.beta.kubernetes.io/instance-id";

/// Source of backend candidates for a Service
#[async_trait]
pub trait CandidateResolver: Send + Sync {
    /// Nodes that may receive traffic for `service`
    async fn resolve(&self, service: &Service) -> Result<Vec<EndpointCandidate>, ControllerError>;
}

/// Address the load balancer should use for a node: InternalIP, else the first address.
pub fn node_address(node: &Node) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    addresses
        .iter()
        .find(|a| a.type_ == "InternalIP")
        .or_else(|| addresses.first())
        .map(|a| a.address.clone())
}

/// Whether the node reports `Ready=True`
pub fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Candidate for a node, or `None` when the node cannot serve traffic
pub fn node_candidate(node: &Node) -> Option<EndpointCandidate> {
    if !node_is_ready(node) {
        return None;
    }
    let name = node.metadata.name.clone()?;
    let server_ip = node_address(node)?;
    let server_id = node
        .annotations()
        .get(INSTANCE_ID_ANNOTATION)
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(|| name.clone());

    Some(EndpointCandidate {
        server_id,
        server_name: name,
        server_ip,
        port: None,
    })
}

/// Renders a Service selector as a label selector string
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Names of the nodes running live pods
pub fn pod_node_names(pods: &[Pod]) -> BTreeSet<String> {
    pods.iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .filter(|p| {
            !matches!(
                p.status.as_ref().and_then(|s| s.phase.as_deref()),
                Some("Succeeded" | "Failed")
            )
        })
        .filter_map(|p| p.spec.as_ref().and_then(|s| s.node_name.clone()))
        .collect()
}

/// Resolves candidates and rejects an empty set, so a transient lack of
/// pods never drains a listener.
pub async fn resolve_candidates(
    resolver: &dyn CandidateResolver,
    service: &Service,
) -> Result<Vec<EndpointCandidate>, ControllerError> {
    let candidates = resolver.resolve(service).await?;
    if candidates.is_empty() {
        return Err(ControllerError::NoAvailableBackends(format!(
            "{}/{}",
            service.namespace().unwrap_or_default(),
            service.name_any()
        )));
    }
    Ok(candidates)
}

/// Every ready node in the cluster
pub struct ClusterNodesResolver {
    nodes: Api<Node>,
}

impl ClusterNodesResolver {
    /// Resolver listing every node through `client`
    pub fn new(client: Client) -> Self {
        Self { nodes: Api::all(client) }
    }
}

#[async_trait]
impl CandidateResolver for ClusterNodesResolver {
    async fn resolve(&self, _service: &Service) -> Result<Vec<EndpointCandidate>, ControllerError> {
        let nodes = self.nodes.list(&ListParams::default()).await?;
        Ok(nodes.items.iter().filter_map(node_candidate).collect())
    }
}

/// Ready nodes hosting at least one pod selected by the Service
pub struct ServicePodNodesResolver {
    client: Client,
    nodes: Api<Node>,
}

impl ServicePodNodesResolver {
    /// Resolver following the Service's pods through `client`
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client.clone()),
            client,
        }
    }
}

#[async_trait]
impl CandidateResolver for ServicePodNodesResolver {
    async fn resolve(&self, service: &Service) -> Result<Vec<EndpointCandidate>, ControllerError> {
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let selector = service
            .spec
            .as_ref()
            .and_then(|s| s.selector.as_ref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "service {}/{} has no selector",
                    namespace,
                    service.name_any()
                ))
            })?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let pods = pods
            .list(&ListParams::default().labels(&label_selector(selector)))
            .await?;
        let node_names = pod_node_names(&pods.items);
        debug!(
            "Service {}/{} has {} pods on {} nodes",
            namespace,
            service.name_any(),
            pods.items.len(),
            node_names.len()
        );

        if node_names.is_empty() {
            return Ok(Vec::new());
        }

        let nodes = self.nodes.list(&ListParams::default()).await?;
        Ok(nodes
            .items
            .iter()
            .filter(|n| {
                n.metadata
                    .name
                    .as_ref()
                    .is_some_and(|name| node_names.contains(name))
            })
            .filter_map(node_candidate)
            .collect())
    }
}
