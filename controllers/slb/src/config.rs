//! Controller configuration.
//!
//! Settings come from environment variables. Parsing goes through a lookup
//! function so it can be exercised without touching the process environment.

use crate::error::ControllerError;
use crate::reconciler::intent::AnnotationDefaults;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// How backend candidates are chosen for a Service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Every ready node in the cluster
    ClusterNodes,
    /// Only ready nodes running a pod selected by the Service
    ServicePodNodes,
}

impl FromStr for BackendMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nodes" | "cluster-nodes" => Ok(Self::ClusterNodes),
            "pods" | "service-pods" => Ok(Self::ServicePodNodes),
            other => Err(ControllerError::InvalidConfig(format!(
                "BACKEND_MODE must be 'nodes' or 'pods', got '{}'",
                other
            ))),
        }
    }
}

/// How the controller authenticates against the SLB API
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Pre-issued bearer token
    Static {
        /// Bearer token sent with every request
        token: String,
    },
    /// Token exchange against the identity provider
    Keycloak {
        /// Token endpoint of the realm
        token_url: String,
        /// Client performing the exchange
        client_id: String,
        /// Secret of `client_id`
        client_secret: String,
        /// Subject the issued token acts for
        requested_subject: String,
    },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { .. } => f.debug_struct("Static").field("token", &"<redacted>").finish(),
            Self::Keycloak { token_url, client_id, requested_subject, .. } => f
                .debug_struct("Keycloak")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("requested_subject", requested_subject)
                .finish(),
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base URL of the SLB API
    pub slb_url_prefix: String,
    /// Empty when no load balancer is configured
    pub slb_id: String,
    /// Credentials for the SLB API
    pub auth: AuthConfig,
    /// Watch a single namespace instead of the whole cluster
    pub namespace: Option<String>,
    /// Which nodes become listener members
    pub backend_mode: BackendMode,
    /// Fallbacks for unset Service annotations
    pub annotation_defaults: AnnotationDefaults,
    /// Timeout of a single SLB API call
    pub request_timeout: Duration,
    /// Upper bound on one reconciliation pass
    pub reconcile_timeout: Duration,
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };
        let seconds = |key: &str, default: u64| -> Result<Duration, ControllerError> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) | Err(_) => Err(ControllerError::InvalidConfig(format!(
                        "{} must be a positive number of seconds, got '{}'",
                        key, raw
                    ))),
                    Ok(secs) => Ok(Duration::from_secs(secs)),
                },
            }
        };

        let slb_url_prefix = require("SLB_URL_PREFIX")?;
        let slb_id = get("SLB_ID").unwrap_or_default();

        let auth = match get("SLB_TOKEN") {
            Some(token) => AuthConfig::Static { token },
            None => AuthConfig::Keycloak {
                token_url: require("KEYCLOAK_URL")?,
                client_id: require("TOKEN_CLIENT_ID")?,
                client_secret: require("CLIENT_SECRET")?,
                requested_subject: require("REQUESTED_SUBJECT")?,
            },
        };

        let backend_mode = match get("BACKEND_MODE") {
            Some(mode) => mode.parse()?,
            None => BackendMode::ServicePodNodes,
        };

        let fallback = AnnotationDefaults::default();
        let annotation_defaults = AnnotationDefaults {
            internal: fallback.internal,
            forward_rule: get("DEFAULT_FORWARD_RULE").unwrap_or(fallback.forward_rule),
            health_check: get("DEFAULT_HEALTH_CHECK").unwrap_or(fallback.health_check),
        };

        Ok(Self {
            slb_url_prefix,
            slb_id,
            auth,
            namespace: get("WATCH_NAMESPACE"),
            backend_mode,
            annotation_defaults,
            request_timeout: seconds("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            reconcile_timeout: seconds("RECONCILE_TIMEOUT_SECS", DEFAULT_RECONCILE_TIMEOUT_SECS)?,
            resync_interval: seconds("RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?,
        })
    }

    /// Log the effective configuration (secrets excluded)
    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  SLB URL: {}", self.slb_url_prefix);
        if self.slb_id.is_empty() {
            warn!("  SLB ID: not configured, LoadBalancer Services will not be provisioned");
        } else {
            info!("  SLB ID: {}", self.slb_id);
        }
        match &self.auth {
            AuthConfig::Static { .. } => info!("  Auth: static token"),
            AuthConfig::Keycloak { token_url, client_id, .. } => {
                info!("  Auth: token exchange at {} as {}", token_url, client_id)
            }
        }
        info!("  Namespace: {}", self.namespace.as_deref().unwrap_or("all namespaces"));
        info!("  Backend mode: {:?}", self.backend_mode);
        info!(
            "  Defaults: forward rule {}, health check {}",
            self.annotation_defaults.forward_rule, self.annotation_defaults.health_check
        );
        info!(
            "  Timeouts: request {}s, reconcile {}s, resync {}s",
            self.request_timeout.as_secs(),
            self.reconcile_timeout.as_secs(),
            self.resync_interval.as_secs()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_static_token_with_defaults() {
        let config = load(&[
            ("SLB_URL_PREFIX", "https://slb.example.com/api/v1"),
            ("SLB_ID", "slb-1"),
            ("SLB_TOKEN", "secret"),
        ])
        .unwrap();

        assert_eq!(config.slb_id, "slb-1");
        assert_eq!(config.auth, AuthConfig::Static { token: "secret".to_string() });
        assert_eq!(config.backend_mode, BackendMode::ServicePodNodes);
        assert_eq!(config.annotation_defaults, AnnotationDefaults::default());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert!(config.namespace.is_none());
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_token_exchange_requires_all_credentials() {
        let err = load(&[
            ("SLB_URL_PREFIX", "https://slb.example.com/api/v1"),
            ("KEYCLOAK_URL", "https://idp.example.com/token"),
            ("TOKEN_CLIENT_ID", "k8s"),
            ("REQUESTED_SUBJECT", "ops"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ControllerError::InvalidConfig(ref msg) if msg.contains("CLIENT_SECRET"))
        );

        let config = load(&[
            ("SLB_URL_PREFIX", "https://slb.example.com/api/v1"),
            ("KEYCLOAK_URL", "https://idp.example.com/token"),
            ("TOKEN_CLIENT_ID", "k8s"),
            ("CLIENT_SECRET", "s3cr3t"),
            ("REQUESTED_SUBJECT", "ops"),
        ])
        .unwrap();
        assert!(
            matches!(config.auth, AuthConfig::Keycloak { ref client_id, .. } if client_id == "k8s")
        );
        assert!(config.slb_id.is_empty());
    }

    #[test]
    fn test_missing_url_prefix() {
        let err = load(&[("SLB_TOKEN", "t")]).unwrap_err();
        assert!(
            matches!(err, ControllerError::InvalidConfig(ref msg) if msg.contains("SLB_URL_PREFIX"))
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SLB_URL_PREFIX", "https://slb"),
            ("SLB_TOKEN", "t"),
            ("WATCH_NAMESPACE", "edge"),
            ("BACKEND_MODE", "nodes"),
            ("DEFAULT_FORWARD_RULE", "WRR"),
            ("DEFAULT_HEALTH_CHECK", "1"),
            ("RECONCILE_TIMEOUT_SECS", "45"),
        ])
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("edge"));
        assert_eq!(config.backend_mode, BackendMode::ClusterNodes);
        assert_eq!(config.annotation_defaults.forward_rule, "WRR");
        assert_eq!(config.annotation_defaults.health_check, "1");
        assert_eq!(config.reconcile_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = [("SLB_URL_PREFIX", "https://slb"), ("SLB_TOKEN", "t")];

        let mut vars = base.to_vec();
        vars.push(("BACKEND_MODE", "endpoints"));
        assert!(load(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("RESYNC_INTERVAL_SECS", "0"));
        assert!(load(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("REQUEST_TIMEOUT_SECS", "soon"));
        assert!(load(&vars).is_err());
    }
}
