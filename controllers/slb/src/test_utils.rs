//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::reconciler::Reconciler;
use crate::reconciler::intent::{
    AnnotationDefaults, EndpointCandidate, ExposureRequest, PortSpec,
};
use k8s_openapi::api::core::v1::{
    Node, NodeAddress, NodeCondition, NodeStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use slb_client::{Backend, Listener, LoadBalancer, MockSlbClient, Protocol};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Load balancer id every test reconciler is configured with
pub const TEST_SLB_ID: &str = "slb-test";
/// Business address of the test load balancer
pub const TEST_BUSINESS_IP: &str = "10.10.0.5";

/// Helper to create the load balancer every test points at
pub fn create_test_load_balancer(eip_address: &str) -> LoadBalancer {
    LoadBalancer {
        slb_id: TEST_SLB_ID.to_string(),
        slb_name: "k8s-edge".to_string(),
        business_ip: TEST_BUSINESS_IP.to_string(),
        eip_address: eip_address.to_string(),
        state: Some("active".to_string()),
    }
}

/// Helper to create a mock control plane holding the test load balancer
pub fn create_test_mock(eip_address: &str) -> MockSlbClient {
    let mock = MockSlbClient::new("http://mock-slb");
    mock.add_load_balancer(create_test_load_balancer(eip_address));
    mock
}

/// Helper to create a reconciler over `mock`
pub fn create_test_reconciler(mock: &MockSlbClient) -> Reconciler {
    Reconciler::new(Arc::new(mock.clone()), TEST_SLB_ID, AnnotationDefaults::default())
}

/// Helper to create a TCP port spec
pub fn tcp_port(external_port: u16, node_port: u16) -> PortSpec {
    PortSpec {
        protocol: Protocol::Tcp,
        external_port,
        node_port: Some(node_port),
    }
}

/// Helper to create a node candidate
pub fn create_test_candidate(server_id: &str, ip: &str) -> EndpointCandidate {
    EndpointCandidate {
        server_id: server_id.to_string(),
        server_name: format!("node-{}", server_id),
        server_ip: ip.to_string(),
        port: None,
    }
}

/// Helper to create an exposure request
pub fn create_test_request(
    ports: Vec<PortSpec>,
    annotations: &[(&str, &str)],
    candidates: Vec<EndpointCandidate>,
) -> ExposureRequest {
    ExposureRequest {
        namespace: "default".to_string(),
        name: "web".to_string(),
        ports,
        annotations: annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        candidates,
    }
}

/// Helper to create a listener already present on the control plane
pub fn create_test_listener(
    listener_id: &str,
    port: u16,
    forward_rule: &str,
    is_health_check: &str,
) -> Listener {
    Listener {
        listener_id: listener_id.to_string(),
        slb_id: TEST_SLB_ID.to_string(),
        listener_name: format!("listener_{}_0", port),
        protocol: Protocol::Tcp,
        port,
        forward_rule: forward_rule.to_string(),
        is_health_check: is_health_check.to_string(),
    }
}

/// Helper to create a registered backend member
pub fn create_test_backend(listener_id: &str, server_id: &str, port: u16) -> Backend {
    Backend {
        backend_id: format!("bk-{}-{}", server_id, port),
        listener_id: listener_id.to_string(),
        server_id: server_id.to_string(),
        port,
        server_name: format!("node-{}", server_id),
        server_ip: "10.0.1.1".to_string(),
        server_type: "ECS".to_string(),
        weight: 1,
    }
}

/// Helper to create a LoadBalancer Service
pub fn create_test_service(name: &str, ports: &[(i32, Option<i32>)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
            ports: Some(
                ports
                    .iter()
                    .map(|(port, node_port)| ServicePort {
                        port: *port,
                        node_port: *node_port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create a Node with the given addresses and readiness
pub fn create_test_node(
    name: &str,
    instance_id: Option<&str>,
    addresses: &[(&str, &str)],
    ready: bool,
) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: instance_id.map(|id| {
                BTreeMap::from([(
                    crate::candidates::INSTANCE_ID_ANNOTATION.to_string(),
                    id.to_string(),
                )])
            }),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(type_, address)| NodeAddress {
                        type_: type_.to_string(),
                        address: address.to_string(),
                    })
                    .collect(),
            ),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Helper to create a deletion timestamp
pub fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap()
}
