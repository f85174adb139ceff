//! Translation between Kubernetes Services and exposure requests.

use crate::error::ControllerError;
use crate::reconciler::intent::{EndpointCandidate, ExposureRequest, PortSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::ResourceExt;
use serde_json::{Value, json};
use slb_client::Protocol;
use tracing::warn;

const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Whether the Service asks for an external load balancer
pub fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some(LOAD_BALANCER_TYPE)
}

/// `namespace/name` of the Service
pub fn service_key(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_else(|| "default".to_string()),
        service.name_any()
    )
}

fn to_u16(value: i32, what: &str, key: &str) -> Result<u16, ControllerError> {
    u16::try_from(value)
        .ok()
        .filter(|v| *v != 0)
        .ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "{} {} of {} is out of range",
                what, value, key
            ))
        })
}

fn port_spec(port: &ServicePort, key: &str) -> Result<PortSpec, ControllerError> {
    let protocol = port
        .protocol
        .as_deref()
        .unwrap_or("TCP")
        .parse::<Protocol>()
        .map_err(|e| ControllerError::InvalidConfig(format!("{}: {}", key, e)))?;
    let node_port = port.node_port.map(|p| to_u16(p, "node port", key)).transpose()?;

    Ok(PortSpec {
        protocol,
        external_port: to_u16(port.port, "port", key)?,
        node_port,
    })
}

fn service_ports(service: &Service) -> &[ServicePort] {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default()
}

/// Port specs of the Service; any unusable port fails the whole Service.
pub fn port_specs(service: &Service) -> Result<Vec<PortSpec>, ControllerError> {
    let key = service_key(service);
    service_ports(service).iter().map(|p| port_spec(p, &key)).collect()
}

/// Port specs for teardown; unusable ports are skipped so the rest can be cleaned up.
pub fn port_specs_lenient(service: &Service) -> Vec<PortSpec> {
    let key = service_key(service);
    service_ports(service)
        .iter()
        .filter_map(|p| match port_spec(p, &key) {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!("Skipping port {} during teardown: {}", p.port, e);
                None
            }
        })
        .collect()
}

fn request(
    service: &Service,
    ports: Vec<PortSpec>,
    candidates: Vec<EndpointCandidate>,
) -> ExposureRequest {
    ExposureRequest {
        namespace: service.namespace().unwrap_or_else(|| "default".to_string()),
        name: service.name_any(),
        ports,
        annotations: service.annotations().clone(),
        candidates,
    }
}

/// Builds the request used to converge the Service
pub fn to_exposure_request(
    service: &Service,
    candidates: Vec<EndpointCandidate>,
) -> Result<ExposureRequest, ControllerError> {
    Ok(request(service, port_specs(service)?, candidates))
}

/// Builds the request used to tear the Service down
pub fn to_teardown_request(service: &Service) -> ExposureRequest {
    request(service, port_specs_lenient(service), Vec::new())
}

/// Ingress IPs currently published on the Service
pub fn current_ingress_ips(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|i| i.ip.clone()).collect())
        .unwrap_or_default()
}

fn published(addresses: &[String]) -> Vec<&str> {
    addresses
        .iter()
        .map(String::as_str)
        .filter(|ip| !ip.is_empty())
        .collect()
}

/// Whether the published ingress differs from `addresses`
pub fn status_needs_update(service: &Service, addresses: &[String]) -> bool {
    let current = current_ingress_ips(service);
    let current: Vec<&str> = current.iter().map(String::as_str).collect();
    current != published(addresses)
}

/// Merge patch publishing `addresses` as the Service ingress
pub fn status_patch(addresses: &[String]) -> Value {
    let ingress: Vec<Value> = published(addresses)
        .into_iter()
        .map(|ip| json!({ "ip": ip }))
        .collect();
    json!({ "status": { "loadBalancer": { "ingress": ingress } } })
}

/// Merge patch removing the published ingress
pub fn clear_status_patch() -> Value {
    json!({ "status": { "loadBalancer": { "ingress": null } } })
}
