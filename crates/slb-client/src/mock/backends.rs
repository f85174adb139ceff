//! Backend member operations for MockSlbClient

use super::{MockCall, MockSlbClient};
use crate::error::SlbError;
use crate::models::*;

pub fn list_backends(
    client: &MockSlbClient,
    _slb_id: &str,
    listener_id: &str,
) -> Result<Vec<Backend>, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::ListBackends { listener_id: listener_id.to_string() })?;

    state.listener(listener_id)?;
    Ok(state.backends.get(listener_id).cloned().unwrap_or_default())
}

pub fn create_backends(
    client: &MockSlbClient,
    opts: &CreateBackendOpts,
) -> Result<Vec<Backend>, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::CreateBackends {
        listener_id: opts.listener_id.clone(),
        server_ids: opts.servers.iter().map(|s| s.server_id.clone()).collect(),
    })?;

    state.listener(&opts.listener_id)?;

    let mut created = Vec::with_capacity(opts.servers.len());
    for server in &opts.servers {
        let backend = Backend {
            backend_id: state.next_id("bk"),
            listener_id: opts.listener_id.clone(),
            server_id: server.server_id.clone(),
            port: server.port,
            server_name: server.server_name.clone(),
            server_ip: server.server_ip.clone(),
            server_type: server.server_type.clone(),
            weight: server.weight,
        };
        created.push(backend);
    }

    state.backends
        .entry(opts.listener_id.clone())
        .or_default()
        .extend(created.iter().cloned());
    Ok(created)
}

pub fn delete_backends(
    client: &MockSlbClient,
    _slb_id: &str,
    listener_id: &str,
    server_ids: &[String],
) -> Result<(), SlbError> {
    let mut state = client.lock();
    state.record(MockCall::DeleteBackends {
        listener_id: listener_id.to_string(),
        server_ids: server_ids.to_vec(),
    })?;

    state.listener(listener_id)?;

    if let Some(members) = state.backends.get_mut(listener_id) {
        members.retain(|b| !server_ids.contains(&b.server_id));
    }
    Ok(())
}
