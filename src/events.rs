//! Events observable from outside the driver: speaking-state changes,
//! membership changes forwarded from the gateway, and session lifecycle
//! notifications.

use crate::driver::state::State;
use crate::id::UserId;
use crate::info::SessionDescription;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// An event forwarded from a live (or formerly live) gateway connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GatewayEvent {
    /// The session's lifecycle state changed.
    StateChanged(State),
    /// `HELLO` was received: the heartbeat interval the gateway wants used
    /// for the rest of this attempt.
    Hello { heartbeat_interval: Duration },
    /// `READY` was received: the assigned ssrc and the UDP endpoint to run
    /// IP discovery against, before protocol selection.
    Ready { ssrc: u32, ip: IpAddr, port: u16, modes: Vec<String> },
    /// `SELECT_PROTOCOL` was sent, carrying the address/port this client's
    /// IP discovery resolved to and the chosen encryption mode.
    SelectProtocol { address: IpAddr, port: u16, mode: String },
    /// `SESSION_DESCRIPTION` was received: the negotiated ssrc, mode, and
    /// secret key used to seal/open audio packets from here on.
    SessionDescription(SessionDescription),
    /// Another participant started or stopped speaking.
    SpeakingStateUpdate { user_id: Option<UserId>, ssrc: u32, speaking: bool },
    /// A participant joined the channel this session is attached to.
    ClientConnect { user_id: UserId, audio_ssrc: u32 },
    /// A participant left the channel this session is attached to.
    ClientDisconnect { user_id: UserId },
    /// The connection was lost and will not be retried.
    Disconnected(Arc<str>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_is_cheaply_cloneable() {
        let ev = GatewayEvent::ClientConnect { user_id: UserId(1), audio_ssrc: 2 };
        let cloned = ev.clone();
        assert!(matches!(cloned, GatewayEvent::ClientConnect { .. }));
    }
}
