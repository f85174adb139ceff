//! Integration tests for SLB client
//!
//! These tests require a reachable SLB control plane.
//! Set SLB_URL, SLB_TOKEN and SLB_ID environment variables to run.

use slb_client::{
    ListenerOpts, Protocol, SlbClient, SlbClientTrait, StaticToken, DEFAULT_REQUEST_TIMEOUT,
};
use std::sync::Arc;

fn client_from_env() -> (SlbClient, String) {
    let url = std::env::var("SLB_URL")
        .unwrap_or_else(|_| "http://localhost:8080/api/v1".to_string());
    let token = std::env::var("SLB_TOKEN")
        .expect("SLB_TOKEN environment variable must be set");
    let slb_id = std::env::var("SLB_ID")
        .expect("SLB_ID environment variable must be set");

    let client = SlbClient::new(url, Arc::new(StaticToken::new(token)), DEFAULT_REQUEST_TIMEOUT)
        .expect("Failed to create client");
    (client, slb_id)
}

#[tokio::test]
#[ignore] // Requires running SLB control plane
async fn test_get_load_balancer() {
    let (client, slb_id) = client_from_env();

    let lb = client.get_load_balancer(&slb_id).await
        .expect("Failed to get load balancer");

    assert_eq!(lb.slb_id, slb_id);
    println!("Load balancer {} business IP {}", lb.slb_name, lb.business_ip);
}

#[tokio::test]
#[ignore]
async fn test_list_listeners() {
    let (client, slb_id) = client_from_env();

    let listeners = client.list_listeners(&slb_id).await
        .expect("Failed to list listeners");

    println!("Found {} listeners", listeners.len());
    for listener in &listeners {
        let members = client.list_backends(&slb_id, &listener.listener_id).await
            .expect("Failed to list backends");
        println!(
            "{} {}:{} -> {} members",
            listener.listener_name,
            listener.protocol,
            listener.port,
            members.len()
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_create_update_and_delete_listener() {
    let (client, slb_id) = client_from_env();

    let port = std::env::var("SLB_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(38080);

    let mut opts = ListenerOpts {
        slb_id: slb_id.clone(),
        listener_name: format!("listener_{}_it", port),
        protocol: Protocol::Tcp,
        port,
        forward_rule: "RR".to_string(),
        is_health_check: ListenerOpts::health_check_flag(false),
    };

    let created = client.create_listener(&opts).await
        .expect("Failed to create listener");
    assert_eq!(created.port, port);

    opts.forward_rule = "WRR".to_string();
    let updated = client.update_listener(&created.listener_id, &opts).await
        .expect("Failed to update listener");
    assert_eq!(updated.forward_rule, "WRR");

    client.delete_listener(&slb_id, &created.listener_id).await
        .expect("Failed to delete listener");

    let err = client.get_listener(&slb_id, &created.listener_id).await
        .expect_err("Listener should be gone");
    assert!(err.is_not_found());
}
