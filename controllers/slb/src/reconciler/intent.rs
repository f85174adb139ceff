//! Exposure requests and desired-state extraction.
//!
//! An [`ExposureRequest`] is the read-only snapshot the host runtime hands to
//! the engine for one pass. [`extract_intent`] resolves its tunables from
//! annotations, falling back to the configured [`AnnotationDefaults`].

use crate::error::ControllerError;
use slb_client::Protocol;
use std::collections::BTreeMap;

/// Marks a Service whose load balancer must only be reachable on the business network
pub const INTERNAL_ANNOTATION: &str = "service.beta.kubernetes.io/inspur-internal-load-balancer";
/// Listener forwarding policy (e.g. `RR`, `WRR`, `LC`)
pub const FORWARD_RULE_ANNOTATION: &str = "loadbalancer.inspur.com/forward-rule";
/// Listener health check toggle
pub const HEALTH_CHECK_ANNOTATION: &str = "loadbalancer.inspur.com/is-healthcheck";

/// One port exposed by the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Transport protocol of the listener
    pub protocol: Protocol,
    /// Frontend port on the load balancer
    pub external_port: u16,
    /// Port every node forwards to the Service, when allocated
    pub node_port: Option<u16>,
}

/// A server that may receive traffic for the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    /// Cloud instance id registered as the member
    pub server_id: String,
    /// Node name
    pub server_name: String,
    /// Address traffic is forwarded to
    pub server_ip: String,
    /// Explicit target port; `None` means the port spec's node port
    pub port: Option<u16>,
}

/// Desired network exposure for one Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureRequest {
    /// Service namespace
    pub namespace: String,
    /// Service name
    pub name: String,
    /// Ports to expose, in Service order
    pub ports: Vec<PortSpec>,
    /// Service annotations
    pub annotations: BTreeMap<String, String>,
    /// Servers that may receive traffic
    pub candidates: Vec<EndpointCandidate>,
}

impl ExposureRequest {
    /// `namespace/name`, used for logging and backoff bookkeeping
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Annotation fallbacks supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDefaults {
    /// Fallback for the internal annotation
    pub internal: String,
    /// Fallback forwarding policy
    pub forward_rule: String,
    /// Fallback health check toggle
    pub health_check: String,
}

impl Default for AnnotationDefaults {
    fn default() -> Self {
        Self {
            internal: "false".to_string(),
            forward_rule: "RR".to_string(),
            health_check: "0".to_string(),
        }
    }
}

/// Tunables resolved for one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    /// Forwarding policy every listener should carry
    pub forward_rule: String,
    /// Whether listeners run health checks
    pub health_check: bool,
    /// Publish only the business address
    pub internal: bool,
    /// Ports to expose
    pub ports: Vec<PortSpec>,
}

/// Returns the annotation value when present (even if empty), else `default`.
pub fn annotation_or_default(
    annotations: &BTreeMap<String, String>,
    key: &str,
    default: &str,
) -> String {
    annotations
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Parses the boolean spellings accepted on annotations.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn bool_annotation(annotations: &BTreeMap<String, String>, key: &str, default: &str) -> bool {
    let fallback = parse_bool(default).unwrap_or(false);
    let value = annotation_or_default(annotations, key, default);
    parse_bool(&value).unwrap_or(fallback)
}

/// Whether the request asks for a business-network-only load balancer.
pub fn is_internal(request: &ExposureRequest, defaults: &AnnotationDefaults) -> bool {
    bool_annotation(&request.annotations, INTERNAL_ANNOTATION, &defaults.internal)
}

/// Resolves the desired state of a request.
///
/// Fails with [`ControllerError::NoPortsConfigured`] when the request declares no ports.
pub fn extract_intent(
    request: &ExposureRequest,
    defaults: &AnnotationDefaults,
) -> Result<DesiredState, ControllerError> {
    if request.ports.is_empty() {
        return Err(ControllerError::NoPortsConfigured(request.key()));
    }

    let annotations = &request.annotations;
    Ok(DesiredState {
        forward_rule: annotation_or_default(
            annotations,
            FORWARD_RULE_ANNOTATION,
            &defaults.forward_rule,
        ),
        health_check: bool_annotation(annotations, HEALTH_CHECK_ANNOTATION, &defaults.health_check),
        internal: is_internal(request, defaults),
        ports: request.ports.clone(),
    })
}
