//! SLB API models
//!
//! These models match the JSON bodies of the SLB control plane. Field names on
//! the wire are camelCase; every response is wrapped in [`ApiResponse`].

use crate::error::SlbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response envelope returned by every SLB endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Business status code. Empty, `"0"` and `"200"` mean success.
    #[serde(default)]
    pub code: serde_json::Value,
    /// Human readable status
    pub message: Option<String>,
    /// Payload, absent for acknowledgement-only responses
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Whether the envelope reports success
    pub fn is_success(&self) -> bool {
        match &self.code {
            serde_json::Value::Null => true,
            serde_json::Value::String(code) => matches!(code.as_str(), "" | "0" | "200"),
            serde_json::Value::Number(code) => matches!(code.as_u64(), Some(0 | 200)),
            _ => false,
        }
    }
}

/// Listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Layer 4 TCP
    Tcp,
    /// Layer 4 UDP
    Udp,
    /// Layer 7 HTTP
    Http,
    /// Layer 7 HTTPS
    Https,
}

impl Protocol {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SlbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "HTTP" => Ok(Self::Http),
            "HTTPS" => Ok(Self::Https),
            other => Err(SlbError::InvalidRequest(format!(
                "unsupported listener protocol: {}",
                other
            ))),
        }
    }
}

/// Load balancer instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Load balancer id
    pub slb_id: String,
    /// Display name
    #[serde(default)]
    pub slb_name: String,
    /// Address on the business (VPC) network, always present
    #[serde(default)]
    pub business_ip: String,
    /// Elastic IP bound to the load balancer, empty when none
    #[serde(default)]
    pub eip_address: String,
    /// Provisioning state reported by the API
    #[serde(default)]
    pub state: Option<String>,
}

/// Listener bound to one frontend port of a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Listener id
    pub listener_id: String,
    /// Owning load balancer
    #[serde(default)]
    pub slb_id: String,
    /// Display name
    #[serde(default)]
    pub listener_name: String,
    /// Frontend protocol
    pub protocol: Protocol,
    /// Frontend port
    pub port: u16,
    /// Forwarding policy, e.g. `RR`
    #[serde(default)]
    pub forward_rule: String,
    /// `"1"` when health checking is enabled, `"0"` otherwise
    #[serde(default)]
    pub is_health_check: String,
}

impl Listener {
    /// Whether health checking is switched on for this listener
    pub fn health_check_enabled(&self) -> bool {
        self.is_health_check == "1"
    }
}

/// Request body for creating or updating a listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOpts {
    /// Owning load balancer
    pub slb_id: String,
    /// Display name
    pub listener_name: String,
    /// Frontend protocol
    pub protocol: Protocol,
    /// Frontend port
    pub port: u16,
    /// Forwarding policy
    pub forward_rule: String,
    /// `"1"` or `"0"`
    pub is_health_check: String,
}

impl ListenerOpts {
    /// Encode a health-check toggle the way the API expects it
    pub fn health_check_flag(enabled: bool) -> String {
        if enabled { "1" } else { "0" }.to_string()
    }
}

/// Backend member registered under a listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Member id
    #[serde(default)]
    pub backend_id: String,
    /// Owning listener
    #[serde(default)]
    pub listener_id: String,
    /// Instance id of the server. Older API revisions capitalise the key.
    #[serde(alias = "ServerId")]
    pub server_id: String,
    /// Port traffic is forwarded to
    pub port: u16,
    /// Server display name
    #[serde(default)]
    pub server_name: String,
    /// Server address
    #[serde(default)]
    pub server_ip: String,
    /// Server kind, e.g. `ECS`
    #[serde(rename = "type", default)]
    pub server_type: String,
    /// Scheduling weight
    #[serde(default)]
    pub weight: u32,
}

/// Server to register as a backend member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendServer {
    /// Instance id of the server
    pub server_id: String,
    /// Port traffic is forwarded to
    pub port: u16,
    /// Server display name
    pub server_name: String,
    /// Server address
    pub server_ip: String,
    /// Server kind, e.g. `ECS`
    #[serde(rename = "type")]
    pub server_type: String,
    /// Scheduling weight
    pub weight: u32,
}

/// Request body for registering backend members
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackendOpts {
    /// Owning load balancer
    pub slb_id: String,
    /// Listener receiving the members
    pub listener_id: String,
    /// Members to register
    pub servers: Vec<BackendServer>,
}

/// Identity provider response to a token exchange
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}
