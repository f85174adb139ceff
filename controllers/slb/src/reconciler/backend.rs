//! Backend membership synchronization.
//!
//! A member is identified by `(server_id, port)`. Removal on the control plane
//! is by server id, so a server with any stale member is removed entirely and
//! its desired members are registered again.

use super::intent::{EndpointCandidate, PortSpec};
use crate::error::ControllerError;
use slb_client::{Backend, BackendServer, CreateBackendOpts, SlbClientTrait};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Server type sent when registering members
pub const BACKEND_SERVER_TYPE: &str = "ECS";
/// Weight of every registered member
pub const BACKEND_WEIGHT: u32 = 1;

/// Changes needed to converge one listener's membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendPlan {
    /// Members to register
    pub to_add: Vec<BackendServer>,
    /// Server ids to deregister
    pub to_remove: Vec<String>,
}

impl BackendPlan {
    /// Whether the listener is already converged
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Translates candidates into the members desired behind `port`.
pub fn desired_servers(
    candidates: &[EndpointCandidate],
    port: &PortSpec,
) -> Result<Vec<BackendServer>, ControllerError> {
    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let target_port = candidate.port.or(port.node_port).ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "{} port {} has no node port and candidate {} has no target port",
                port.protocol, port.external_port, candidate.server_id
            ))
        })?;

        if !seen.insert((candidate.server_id.clone(), target_port)) {
            continue;
        }

        servers.push(BackendServer {
            server_id: candidate.server_id.clone(),
            port: target_port,
            server_name: candidate.server_name.clone(),
            server_ip: candidate.server_ip.clone(),
            server_type: BACKEND_SERVER_TYPE.to_string(),
            weight: BACKEND_WEIGHT,
        });
    }

    Ok(servers)
}

/// Diffs registered members against the desired ones.
pub fn plan_backend_sync(current: &[Backend], desired: &[BackendServer]) -> BackendPlan {
    let wanted: HashSet<(&str, u16)> = desired
        .iter()
        .map(|s| (s.server_id.as_str(), s.port))
        .collect();
    let present: HashSet<(&str, u16)> = current
        .iter()
        .map(|b| (b.server_id.as_str(), b.port))
        .collect();

    let mut to_remove: Vec<String> = Vec::new();
    for member in current {
        if !wanted.contains(&(member.server_id.as_str(), member.port))
            && !to_remove.contains(&member.server_id)
        {
            to_remove.push(member.server_id.clone());
        }
    }

    let to_add = desired
        .iter()
        .filter(|s| {
            !present.contains(&(s.server_id.as_str(), s.port)) || to_remove.contains(&s.server_id)
        })
        .cloned()
        .collect();

    BackendPlan { to_add, to_remove }
}

/// Converges the members of one listener.
///
/// Removals and additions are attempted independently; if either fails the
/// call returns [`ControllerError::PartialSyncFailure`] naming the failed
/// server ids.
pub async fn sync_backends(
    client: &dyn SlbClientTrait,
    slb_id: &str,
    listener_id: &str,
    desired: &[BackendServer],
) -> Result<BackendPlan, ControllerError> {
    let current = client.list_backends(slb_id, listener_id).await?;
    let plan = plan_backend_sync(&current, desired);

    if plan.is_empty() {
        debug!("Listener {} members already converged ({} members)", listener_id, current.len());
        return Ok(plan);
    }

    info!(
        "Syncing listener {} members: {} to add, {} to remove",
        listener_id,
        plan.to_add.len(),
        plan.to_remove.len()
    );

    let mut failed_removals = Vec::new();
    if !plan.to_remove.is_empty() {
        if let Err(e) = client.delete_backends(slb_id, listener_id, &plan.to_remove).await {
            warn!(
                "Failed to remove members {:?} from listener {}: {}",
                plan.to_remove, listener_id, e
            );
            failed_removals = plan.to_remove.clone();
        }
    }

    // Members of servers whose removal failed are still registered
    let additions: Vec<BackendServer> = if failed_removals.is_empty() {
        plan.to_add.clone()
    } else {
        plan.to_add
            .iter()
            .filter(|s| {
                !current
                    .iter()
                    .any(|b| b.server_id == s.server_id && b.port == s.port)
            })
            .cloned()
            .collect()
    };

    let mut failed_additions = Vec::new();
    if !additions.is_empty() {
        let opts = CreateBackendOpts {
            slb_id: slb_id.to_string(),
            listener_id: listener_id.to_string(),
            servers: additions,
        };
        if let Err(e) = client.create_backends(&opts).await {
            warn!("Failed to add members to listener {}: {}", listener_id, e);
            failed_additions = opts.servers.into_iter().map(|s| s.server_id).collect();
        }
    }

    if !failed_additions.is_empty() || !failed_removals.is_empty() {
        return Err(ControllerError::PartialSyncFailure {
            listener_id: listener_id.to_string(),
            failed_additions,
            failed_removals,
        });
    }

    Ok(plan)
}
