//! Listener matching and request building.

use super::intent::{DesiredState, PortSpec};
use slb_client::{Listener, ListenerOpts};

/// Generated name of the listener for the `index`-th port of a request.
pub fn listener_name(port: &PortSpec, index: usize) -> String {
    format!("listener_{}_{}", port.external_port, index)
}

/// Finds the remote listener serving `port`, keyed by protocol and frontend port.
///
/// The first match wins; duplicates are left alone.
pub fn match_listener<'a>(listeners: &'a [Listener], port: &PortSpec) -> Option<&'a Listener> {
    listeners
        .iter()
        .find(|l| l.protocol == port.protocol && l.port == port.external_port)
}

/// Whether an existing listener drifted from the desired policy.
pub fn needs_update(listener: &Listener, desired: &DesiredState) -> bool {
    listener.forward_rule != desired.forward_rule
        || listener.health_check_enabled() != desired.health_check
}

/// Body for creating or updating the listener of `port`.
pub fn listener_opts(
    slb_id: &str,
    listener_name: String,
    port: &PortSpec,
    desired: &DesiredState,
) -> ListenerOpts {
    ListenerOpts {
        slb_id: slb_id.to_string(),
        listener_name,
        protocol: port.protocol,
        port: port.external_port,
        forward_rule: desired.forward_rule.clone(),
        is_health_check: ListenerOpts::health_check_flag(desired.health_check),
    }
}
