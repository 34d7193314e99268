//! Internal message types passed between the driver loop and its background
//! tasks over [`flume`] channels.

use crate::info::VoiceServerOptions;
use crate::ws::WsStream;
use std::time::Duration;

/// Requests made of the running driver loop, either by the public
/// [`ConnectionHandle`](crate::handle::ConnectionHandle) or by a background
/// task that detected a problem.
#[derive(Debug)]
pub(crate) enum CoreMessage {
    /// The websocket task lost its connection; `close_code` is the numeric
    /// close code if the remote sent one. The driver loop classifies this
    /// against the reconnect policy to decide what happens next.
    ConnectionLost { close_code: Option<u16> },
    /// Caller-requested reconnect, independent of any observed failure.
    Reconnect,
    /// The remote migrated this session to a new voice server; tear down and
    /// reconnect fresh against the new endpoint/token.
    FullReconnect(Box<VoiceServerOptions>),
    /// Tear the connection down and do not retry.
    Disconnect,
    /// An injected send task reports a speaking-state change; forwarded to
    /// whichever websocket task is currently live.
    Speaking(bool),
}

/// Messages sent from the driver loop down to the running websocket task.
#[derive(Debug)]
pub(crate) enum WsMessage {
    /// Replace the live websocket stream (after a reconnect/resume).
    Ws(Box<WsStream>),
    /// The server renegotiated the heartbeat interval.
    SetKeepalive(Duration),
    /// A send task reported a speaking-state change; forward it as a
    /// `Speaking` payload if it differs from what was last announced.
    Speaking(bool),
}
