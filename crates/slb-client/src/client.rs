//! SLB API client
//!
//! Implements the SLB REST API client for listener and backend management.
//! Paths are relative to the configured URL prefix:
//! `/slbs/{slbId}`, `/slbs/{slbId}/listeners[/{listenerId}[/members]]`.

use crate::auth::TokenSource;
use crate::common::{HttpClient, segment};
use crate::error::SlbError;
use crate::models::*;
use crate::slb_trait::SlbClientTrait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// SLB API client
#[derive(Debug, Clone)]
pub struct SlbClient {
    http: HttpClient,
}

impl SlbClient {
    /// Create a new SLB client
    ///
    /// # Arguments
    /// * `base_url` - SLB API URL prefix (e.g., "https://slb.example.com/api/v1")
    /// * `tokens` - Source of bearer tokens
    /// * `timeout` - Per-request timeout; an expired request is aborted
    pub fn new(
        base_url: String,
        tokens: Arc<dyn TokenSource>,
        timeout: Duration,
    ) -> Result<Self, SlbError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SlbError::Http)?;

        Ok(Self::with_client(client, base_url, tokens))
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: Client, base_url: String, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: HttpClient::new(client, base_url, tokens),
        }
    }

    fn slb_path(slb_id: &str) -> String {
        format!("/slbs/{}", segment(slb_id))
    }

    fn listeners_path(slb_id: &str) -> String {
        format!("{}/listeners", Self::slb_path(slb_id))
    }

    fn listener_path(slb_id: &str, listener_id: &str) -> String {
        format!("{}/{}", Self::listeners_path(slb_id), segment(listener_id))
    }

    fn members_path(slb_id: &str, listener_id: &str) -> String {
        format!("{}/members", Self::listener_path(slb_id, listener_id))
    }

    /// Get a load balancer by ID
    ///
    /// # Returns
    /// * `Ok(LoadBalancer)` - The load balancer
    /// * `Err(SlbError::NotFound)` - No load balancer with that ID
    pub async fn get_load_balancer(&self, slb_id: &str) -> Result<LoadBalancer, SlbError> {
        debug!("Fetching load balancer {}", slb_id);
        self.http.get(&Self::slb_path(slb_id)).await
    }

    /// List all listeners of a load balancer
    pub async fn list_listeners(&self, slb_id: &str) -> Result<Vec<Listener>, SlbError> {
        debug!("Listing listeners of load balancer {}", slb_id);
        self.http.get_list(&Self::listeners_path(slb_id)).await
    }

    /// Get a single listener
    pub async fn get_listener(
        &self,
        slb_id: &str,
        listener_id: &str,
    ) -> Result<Listener, SlbError> {
        self.http.get(&Self::listener_path(slb_id, listener_id)).await
    }

    /// Create a listener
    ///
    /// Some API revisions only acknowledge the create. In that case the new
    /// listener is looked up by protocol and port.
    pub async fn create_listener(&self, opts: &ListenerOpts) -> Result<Listener, SlbError> {
        let created: Option<Listener> = self.http
            .post(&Self::listeners_path(&opts.slb_id), opts)
            .await?;

        let listener = match created {
            Some(listener) => listener,
            None => self.list_listeners(&opts.slb_id)
                .await?
                .into_iter()
                .find(|l| l.protocol == opts.protocol && l.port == opts.port)
                .ok_or_else(|| SlbError::NotFound(format!(
                    "listener {} not visible after create",
                    opts.listener_name
                )))?,
        };

        info!(
            "Created listener {} ({} {}) on {}",
            listener.listener_id, opts.protocol, opts.port, opts.slb_id
        );
        Ok(listener)
    }

    /// Update a listener in place
    pub async fn update_listener(
        &self,
        listener_id: &str,
        opts: &ListenerOpts,
    ) -> Result<Listener, SlbError> {
        let updated: Option<Listener> = self.http
            .put(&Self::listener_path(&opts.slb_id, listener_id), opts)
            .await?;

        info!("Updated listener {} on {}", listener_id, opts.slb_id);
        match updated {
            Some(listener) => Ok(listener),
            None => self.get_listener(&opts.slb_id, listener_id).await,
        }
    }

    /// Delete a listener
    pub async fn delete_listener(&self, slb_id: &str, listener_id: &str) -> Result<(), SlbError> {
        self.http.delete(&Self::listener_path(slb_id, listener_id)).await?;
        info!("Deleted listener {} from {}", listener_id, slb_id);
        Ok(())
    }

    /// List backend members of a listener
    pub async fn list_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<Backend>, SlbError> {
        self.http.get_list(&Self::members_path(slb_id, listener_id)).await
    }

    /// Register backend members under a listener
    pub async fn create_backends(
        &self,
        opts: &CreateBackendOpts,
    ) -> Result<Vec<Backend>, SlbError> {
        if opts.servers.is_empty() {
            return Err(SlbError::InvalidRequest("no backend servers to register".to_string()));
        }

        let created: Option<Vec<Backend>> = self.http
            .post(&Self::members_path(&opts.slb_id, &opts.listener_id), opts)
            .await?;

        info!("Registered {} backend(s) under listener {}", opts.servers.len(), opts.listener_id);
        Ok(created.unwrap_or_default())
    }

    /// Remove backend members from a listener by server ID
    pub async fn delete_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
        server_ids: &[String],
    ) -> Result<(), SlbError> {
        if server_ids.is_empty() {
            return Ok(());
        }

        let ids = server_ids.iter()
            .map(|id| segment(id))
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("{}?serverIds={}", Self::members_path(slb_id, listener_id), ids);

        self.http.delete(&path).await?;
        info!("Removed {} backend(s) from listener {}", server_ids.len(), listener_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SlbClientTrait for SlbClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn get_load_balancer(&self, slb_id: &str) -> Result<LoadBalancer, SlbError> {
        SlbClient::get_load_balancer(self, slb_id).await
    }

    async fn list_listeners(&self, slb_id: &str) -> Result<Vec<Listener>, SlbError> {
        SlbClient::list_listeners(self, slb_id).await
    }

    async fn get_listener(&self, slb_id: &str, listener_id: &str) -> Result<Listener, SlbError> {
        SlbClient::get_listener(self, slb_id, listener_id).await
    }

    async fn create_listener(&self, opts: &ListenerOpts) -> Result<Listener, SlbError> {
        SlbClient::create_listener(self, opts).await
    }

    async fn update_listener(
        &self,
        listener_id: &str,
        opts: &ListenerOpts,
    ) -> Result<Listener, SlbError> {
        SlbClient::update_listener(self, listener_id, opts).await
    }

    async fn delete_listener(&self, slb_id: &str, listener_id: &str) -> Result<(), SlbError> {
        SlbClient::delete_listener(self, slb_id, listener_id).await
    }

    async fn list_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<Backend>, SlbError> {
        SlbClient::list_backends(self, slb_id, listener_id).await
    }

    async fn create_backends(&self, opts: &CreateBackendOpts) -> Result<Vec<Backend>, SlbError> {
        SlbClient::create_backends(self, opts).await
    }

    async fn delete_backends(
        &self,
        slb_id: &str,
        listener_id: &str,
        server_ids: &[String],
    ) -> Result<(), SlbError> {
        SlbClient::delete_backends(self, slb_id, listener_id, server_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{KeycloakTokenSource, StaticToken};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SlbClient {
        SlbClient::new(
            format!("{}/slb/v1/", server.uri()),
            Arc::new(StaticToken::new("test-token")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn envelope(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "0",
            "message": "success",
            "data": data
        }))
    }

    #[tokio::test]
    async fn test_rejected_token_is_exchanged_again() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-2",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1"))
            .and(header("Authorization", "Bearer tok-2"))
            .respond_with(envelope(serde_json::json!({
                "slbId": "slb-1",
                "businessIp": "10.0.0.10"
            })))
            .mount(&server)
            .await;

        let tokens = KeycloakTokenSource::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "slb-controller",
            "s3cr3t",
            "cluster-admin",
        );
        let client = SlbClient::new(
            format!("{}/slb/v1", server.uri()),
            Arc::new(tokens),
            Duration::from_secs(5),
        )
        .unwrap();

        let first = client.get_load_balancer("slb-1").await;
        assert!(matches!(first, Err(SlbError::Authentication(_))));

        let lb = client.get_load_balancer("slb-1").await.unwrap();
        assert_eq!(lb.business_ip, "10.0.0.10");
    }

    #[tokio::test]
    async fn test_get_load_balancer_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(envelope(serde_json::json!({
                "slbId": "slb-1",
                "slbName": "k8s-ingress",
                "businessIp": "10.0.0.10",
                "eipAddress": "203.0.113.7"
            })))
            .mount(&server)
            .await;

        let lb = client_for(&server).get_load_balancer("slb-1").await.unwrap();
        assert_eq!(lb.slb_name, "k8s-ingress");
        assert_eq!(lb.business_ip, "10.0.0.10");
        assert_eq!(lb.eip_address, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_missing_load_balancer_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such slb"))
            .mount(&server)
            .await;

        let err = client_for(&server).get_load_balancer("gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1/listeners"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).list_listeners("slb-1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_error_envelope_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/slb/v1/slbs/slb-1/listeners"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "SLB.Listener.PortConflict",
                "message": "port 80 already in use"
            })))
            .mount(&server)
            .await;

        let opts = ListenerOpts {
            slb_id: "slb-1".to_string(),
            listener_name: "listener_80_0".to_string(),
            protocol: Protocol::Tcp,
            port: 80,
            forward_rule: "RR".to_string(),
            is_health_check: "0".to_string(),
        };
        let err = client_for(&server).create_listener(&opts).await.unwrap_err();
        match err {
            SlbError::Api(msg) => assert!(msg.contains("port 80 already in use")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_listener_falls_back_to_lookup_when_only_acknowledged() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/slb/v1/slbs/slb-1/listeners"))
            .and(body_partial_json(serde_json::json!({
                "listenerName": "listener_443_1",
                "protocol": "TCP",
                "port": 443,
                "isHealthCheck": "1"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": "0"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1/listeners"))
            .respond_with(envelope(serde_json::json!([{
                "listenerId": "lsn-9",
                "slbId": "slb-1",
                "listenerName": "listener_443_1",
                "protocol": "TCP",
                "port": 443,
                "forwardRule": "RR",
                "isHealthCheck": "1"
            }])))
            .mount(&server)
            .await;

        let opts = ListenerOpts {
            slb_id: "slb-1".to_string(),
            listener_name: "listener_443_1".to_string(),
            protocol: Protocol::Tcp,
            port: 443,
            forward_rule: "RR".to_string(),
            is_health_check: "1".to_string(),
        };
        let listener = client_for(&server).create_listener(&opts).await.unwrap();
        assert_eq!(listener.listener_id, "lsn-9");
    }

    #[tokio::test]
    async fn test_delete_backends_passes_server_ids() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/slb/v1/slbs/slb-1/listeners/lsn-1/members"))
            .and(query_param("serverIds", "i-a,i-b"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_backends("slb-1", "lsn-1", &["i-a".to_string(), "i-b".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_backends_with_no_ids_is_a_no_op() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        client_for(&server).delete_backends("slb-1", "lsn-1", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_backends_with_null_data_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slb/v1/slbs/slb-1/listeners/lsn-1/members"))
            .respond_with(envelope(serde_json::Value::Null))
            .mount(&server)
            .await;

        let backends = client_for(&server).list_backends("slb-1", "lsn-1").await.unwrap();
        assert!(backends.is_empty());
    }

    #[tokio::test]
    async fn test_request_timeout_aborts_call() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(envelope(serde_json::Value::Null).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let client = SlbClient::new(
            server.uri(),
            Arc::new(StaticToken::new("t")),
            Duration::from_millis(100),
        )
        .unwrap();

        let err = client.list_listeners("slb-1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
