//! Load balancer and listener operations for MockSlbClient

use super::{MockCall, MockSlbClient};
use crate::error::SlbError;
use crate::models::*;

pub fn get_load_balancer(client: &MockSlbClient, slb_id: &str) -> Result<LoadBalancer, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::GetLoadBalancer { slb_id: slb_id.to_string() })?;

    state.load_balancers
        .get(slb_id)
        .cloned()
        .ok_or_else(|| SlbError::NotFound(format!("Load balancer {} not found", slb_id)))
}

pub fn list_listeners(client: &MockSlbClient, slb_id: &str) -> Result<Vec<Listener>, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::ListListeners { slb_id: slb_id.to_string() })?;

    if !state.load_balancers.contains_key(slb_id) {
        return Err(SlbError::NotFound(format!("Load balancer {} not found", slb_id)));
    }

    Ok(state.listeners
        .iter()
        .filter(|l| l.slb_id == slb_id)
        .cloned()
        .collect())
}

pub fn get_listener(
    client: &MockSlbClient,
    _slb_id: &str,
    listener_id: &str,
) -> Result<Listener, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::GetListener { listener_id: listener_id.to_string() })?;

    state.listener(listener_id).cloned()
}

pub fn create_listener(client: &MockSlbClient, opts: &ListenerOpts) -> Result<Listener, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::CreateListener {
        listener_name: opts.listener_name.clone(),
        protocol: opts.protocol,
        port: opts.port,
    })?;

    if !state.load_balancers.contains_key(&opts.slb_id) {
        return Err(SlbError::NotFound(format!("Load balancer {} not found", opts.slb_id)));
    }

    // The control plane refuses two listeners on the same frontend
    let conflict = state.listeners.iter().any(|l| {
        l.slb_id == opts.slb_id && l.protocol == opts.protocol && l.port == opts.port
    });
    if conflict {
        return Err(SlbError::Api(format!(
            "{} port {} already has a listener on {}",
            opts.protocol, opts.port, opts.slb_id
        )));
    }

    let listener = Listener {
        listener_id: state.next_id("lsn"),
        slb_id: opts.slb_id.clone(),
        listener_name: opts.listener_name.clone(),
        protocol: opts.protocol,
        port: opts.port,
        forward_rule: opts.forward_rule.clone(),
        is_health_check: opts.is_health_check.clone(),
    };

    state.listeners.push(listener.clone());
    Ok(listener)
}

pub fn update_listener(
    client: &MockSlbClient,
    listener_id: &str,
    opts: &ListenerOpts,
) -> Result<Listener, SlbError> {
    let mut state = client.lock();
    state.record(MockCall::UpdateListener { listener_id: listener_id.to_string() })?;

    let listener = state.listeners
        .iter_mut()
        .find(|l| l.listener_id == listener_id)
        .ok_or_else(|| SlbError::NotFound(format!("Listener {} not found", listener_id)))?;

    listener.listener_name = opts.listener_name.clone();
    listener.protocol = opts.protocol;
    listener.port = opts.port;
    listener.forward_rule = opts.forward_rule.clone();
    listener.is_health_check = opts.is_health_check.clone();

    Ok(listener.clone())
}

pub fn delete_listener(
    client: &MockSlbClient,
    _slb_id: &str,
    listener_id: &str,
) -> Result<(), SlbError> {
    let mut state = client.lock();
    state.record(MockCall::DeleteListener { listener_id: listener_id.to_string() })?;

    state.listener(listener_id)?;

    // Members must be removed before their listener
    let has_members = state.backends
        .get(listener_id)
        .is_some_and(|members| !members.is_empty());
    if has_members {
        return Err(SlbError::Api(format!(
            "Listener {} still has backend members",
            listener_id
        )));
    }

    state.listeners.retain(|l| l.listener_id != listener_id);
    state.backends.remove(listener_id);
    Ok(())
}
