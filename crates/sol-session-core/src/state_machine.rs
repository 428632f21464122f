use crate::domain::ConnectionStatus;
use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// User asked to connect.
    Connect,
    ProviderApproved,
    ProviderFailed,
    /// User asked to disconnect.
    Disconnect,
    /// Provider emitted `connect`, or a pre-existing session was found at mount.
    ProviderConnected,
    /// Provider emitted `disconnect`.
    ProviderDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    pub reason: &'static str,
}

pub fn session_transition(
    from: ConnectionStatus,
    action: SessionAction,
) -> Result<StateTransition, TransitionError> {
    use ConnectionStatus::*;
    use SessionAction::*;

    let (to, reason) = match (from, action) {
        (Disconnected, Connect) => (Connecting, "connect_requested"),
        (Connecting, ProviderApproved) => (Connected, "provider_approved"),
        (Connecting, ProviderFailed) => (Disconnected, "provider_failed"),
        (_, Disconnect) => (Disconnected, "disconnect_requested"),
        (_, ProviderConnected) => (Connected, "provider_connected"),
        (_, ProviderDisconnected) => (Disconnected, "provider_disconnected"),
        _ => return Err(TransitionError { from, action }),
    };
    Ok(StateTransition { from, to, reason })
}
